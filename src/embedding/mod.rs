//! Text-to-vector embedding seam.
//!
//! The engine does not compute embeddings. Nodes normally carry a precomputed
//! vector; when they do not, [`EmbeddingSimilarity`](crate::graph::metrics::EmbeddingSimilarity)
//! can fall back to an [`EmbeddingProvider`] supplied by the caller.

use std::sync::Arc;

use anyhow::Result;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

type EmbedFn = dyn Fn(&str) -> Result<Vec<f32>> + Send + Sync;

/// Adapts a plain function into an [`EmbeddingProvider`].
///
/// Output length is checked against `dimensions` on every call.
#[derive(Clone)]
pub struct FnProvider {
    dimensions: usize,
    normalize: bool,
    embed: Arc<EmbedFn>,
}

impl FnProvider {
    pub fn new<F>(dimensions: usize, embed: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<f32>> + Send + Sync + 'static,
    {
        Self {
            dimensions,
            normalize: false,
            embed: Arc::new(embed),
        }
    }

    /// L2-normalize every vector the function returns.
    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }
}

impl std::fmt::Debug for FnProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProvider")
            .field("dimensions", &self.dimensions)
            .field("normalize", &self.normalize)
            .finish_non_exhaustive()
    }
}

impl EmbeddingProvider for FnProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = (self.embed)(text)?;
        anyhow::ensure!(
            vector.len() == self.dimensions,
            "embedding function returned {} dimensions, expected {}",
            vector.len(),
            self.dimensions
        );
        Ok(if self.normalize {
            l2_normalize(&vector)
        } else {
            vector
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
