//! Error taxonomy for the graph engine and vector indexes.
//!
//! Every failure is surfaced to the immediate caller. Nothing in the core
//! retries, skips a failing pair, or degrades to a partial result.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or underspecified configuration. Raised before any scoring or
    /// index work begins.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A vector (record or query) does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The backend cannot perform this operation without a full rebuild.
    #[error("{backend} does not support {operation}")]
    UnsupportedOperation {
        backend: &'static str,
        operation: String,
    },

    /// The accessor has no record for this node.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node exists but lacks the feature a metric needs.
    #[error("node {node} has no {feature}")]
    MissingFeature { node: String, feature: &'static str },

    /// A metric produced NaN or an infinite value.
    #[error("metric returned a non-finite score for {src} -> {dst}")]
    NonFiniteScore { src: String, dst: String },

    /// The external embedding function failed.
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            backend,
            operation: operation.into(),
        }
    }
}

/// Fail with [`Error::DimensionMismatch`] unless `actual == expected`.
pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { expected, actual })
    }
}
