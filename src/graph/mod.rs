//! Similarity graph over experience nodes.
//!
//! - [`types`]: layer tags, node references, edges
//! - [`accessor`]: the read-only seam metrics use to reach node data
//! - [`metrics`]: pluggable similarity functions
//! - [`builder`]: exact O(n²) edge construction
//! - [`candidates`]: index-backed edge construction for larger sets

pub mod accessor;
pub mod builder;
pub mod candidates;
pub mod metrics;
pub mod types;

pub use accessor::{InMemoryAccessor, NodeAccessor, NodeFeatures};
pub use builder::{build_similarity_edges, BuildEdgesConfig, MirrorWeight};
pub use candidates::{build_candidate_edges, index_nodes};
pub use metrics::{
    CompositeBlend, EmbeddingSimilarity, LexicalOverlap, SimilarityMetric, TemporalProximity,
    VectorSimilarity,
};
pub use types::{Edge, EdgeMeta, Layer, MetricSpec, NodeRef};
