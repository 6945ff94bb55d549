//! Similarity-driven graph construction over layered experience records.
//!
//! Experience nodes live on three layers (events, patterns, principles) and
//! are connected by edges whose weights come from a pluggable similarity
//! metric. Edge construction runs either exactly over all pairs or over
//! candidates retrieved from a vector index.
//!
//! | Metric | Reads | Range |
//! |--------|-------|-------|
//! | [`LexicalOverlap`](graph::LexicalOverlap) | text / fields | `[0, 1]` |
//! | [`EmbeddingSimilarity`](graph::EmbeddingSimilarity) cosine | embedding | `[-1, 1]` |
//! | [`EmbeddingSimilarity`](graph::EmbeddingSimilarity) inner product | embedding | unbounded |
//! | [`TemporalProximity`](graph::TemporalProximity) | timestamp | `(0, 1]` |
//! | [`CompositeBlend`](graph::CompositeBlend) | components | weighted |
//!
//! # Modules
//!
//! - [`graph`]: node and edge model, metrics, and the edge builders
//! - [`index`]: vector index trait with flat, IVF and sqlite-vec backends
//! - [`embedding`]: the seam for plugging in an external embedding function
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite setup with the sqlite-vec extension
//! - [`error`]: the error type shared by all of the above

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod index;

pub use error::{Error, Result};
