//! Pairwise similarity metrics.
//!
//! Every way of generating similarity edges is a [`SimilarityMetric`] plus an
//! edge-building policy. Metrics are pure: the score depends only on the two
//! nodes' features as resolved through the [`NodeAccessor`].
//!
//! | Metric | Reads | Range | Symmetric |
//! |--------|-------|-------|-----------|
//! | [`LexicalOverlap`] | text / named fields | `[0, 1]` | yes |
//! | [`EmbeddingSimilarity`] (cosine) | embedding | `[-1, 1]` | yes |
//! | [`EmbeddingSimilarity`] (inner product) | embedding | unbounded | yes |
//! | [`TemporalProximity`] | timestamp | `(0, 1]` | yes |
//! | [`CompositeBlend`] | components | weighted sum | if all components are |

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::accessor::{NodeAccessor, NodeFeatures};
use super::types::{MetricSpec, NodeRef};
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, Result};

/// Scores relatedness of two nodes.
///
/// Thresholds in [`BuildEdgesConfig`](super::builder::BuildEdgesConfig) are
/// compared directly against the returned value, so each implementation
/// documents its scale. The score must be finite and deterministic.
pub trait SimilarityMetric: Send + Sync {
    fn name(&self) -> &str;

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64>;

    /// Audit description of this metric instance.
    fn spec(&self) -> MetricSpec {
        MetricSpec::new(self.name())
    }

    /// Whether `similarity(u, v) == similarity(v, u)` holds for all inputs.
    fn is_symmetric(&self) -> bool {
        true
    }
}

// ── Lexical ──────────────────────────────────────────────────────────────────

/// Jaccard overlap of lowercase alphanumeric token sets. Range `[0, 1]`.
///
/// By default reads all text of the node ([`NodeFeatures::full_text`]). With
/// [`LexicalOverlap::over_fields`] only the named fields are read; the name
/// `"text"` selects the free-text slot. Two nodes without tokens score 0.
#[derive(Debug, Clone, Default)]
pub struct LexicalOverlap {
    fields: Vec<String>,
}

impl LexicalOverlap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn over_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn tokens(&self, features: &NodeFeatures) -> BTreeSet<String> {
        if self.fields.is_empty() {
            return tokenize(&features.full_text());
        }
        let mut tokens = BTreeSet::new();
        for field in &self.fields {
            let value = if field == "text" {
                features.text.as_deref()
            } else {
                features.fields.get(field).map(String::as_str)
            };
            if let Some(value) = value {
                tokens.extend(tokenize(value));
            }
        }
        tokens
    }
}

impl SimilarityMetric for LexicalOverlap {
    fn name(&self) -> &str {
        "lexical_overlap"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64> {
        let fu = accessor.features(u)?;
        let fv = accessor.features(v)?;
        Ok(jaccard(&self.tokens(&fu), &self.tokens(&fv)))
    }

    fn spec(&self) -> MetricSpec {
        let spec = MetricSpec::new(self.name());
        if self.fields.is_empty() {
            spec
        } else {
            spec.with_param("fields", self.fields.clone())
        }
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

// ── Embedding ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSimilarity {
    /// Cosine of the angle, `[-1, 1]`. Zero-norm vectors score 0.
    Cosine,
    /// Raw dot product, unbounded. Equals cosine for L2-normalized vectors.
    InnerProduct,
}

impl VectorSimilarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
        }
    }
}

/// Dense-vector similarity over node embeddings.
///
/// Uses the node's precomputed `embedding`. When a node has none and a
/// provider is attached, the node's text is embedded on the fly; otherwise
/// scoring fails with [`Error::MissingFeature`].
#[derive(Clone)]
pub struct EmbeddingSimilarity {
    kind: VectorSimilarity,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingSimilarity {
    pub fn new(kind: VectorSimilarity) -> Self {
        Self {
            kind,
            provider: None,
        }
    }

    pub fn cosine() -> Self {
        Self::new(VectorSimilarity::Cosine)
    }

    pub fn inner_product() -> Self {
        Self::new(VectorSimilarity::InnerProduct)
    }

    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn vector<'a>(&self, node: &NodeRef, features: &'a NodeFeatures) -> Result<Cow<'a, [f32]>> {
        if let Some(embedding) = &features.embedding {
            return Ok(Cow::Borrowed(embedding.as_slice()));
        }
        let text = features.full_text();
        match &self.provider {
            Some(provider) if !text.is_empty() => provider
                .embed(&text)
                .map(Cow::Owned)
                .map_err(Error::Embedding),
            _ => Err(Error::MissingFeature {
                node: node.to_string(),
                feature: "embedding",
            }),
        }
    }
}

impl std::fmt::Debug for EmbeddingSimilarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSimilarity")
            .field("kind", &self.kind)
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl SimilarityMetric for EmbeddingSimilarity {
    fn name(&self) -> &str {
        "embedding_similarity"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64> {
        let fu = accessor.features(u)?;
        let fv = accessor.features(v)?;
        let a = self.vector(u, &fu)?;
        let b = self.vector(v, &fv)?;
        crate::error::check_dimension(a.len(), b.len())?;

        let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
        Ok(match self.kind {
            VectorSimilarity::InnerProduct => dot,
            VectorSimilarity::Cosine => {
                let na = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
                let nb = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot / (na * nb)
                }
            }
        })
    }

    fn spec(&self) -> MetricSpec {
        MetricSpec::new(self.name()).with_param("kind", self.kind.as_str())
    }
}

// ── Temporal ─────────────────────────────────────────────────────────────────

/// Exponential decay over the time between two experiences: `0.5^(|Δt| / half_life)`.
///
/// Range `(0, 1]`; identical timestamps score 1.
#[derive(Debug, Clone)]
pub struct TemporalProximity {
    half_life: chrono::Duration,
}

impl TemporalProximity {
    pub fn new(half_life: chrono::Duration) -> Result<Self> {
        if half_life <= chrono::Duration::zero() {
            return Err(Error::config("temporal half-life must be positive"));
        }
        Ok(Self { half_life })
    }
}

impl SimilarityMetric for TemporalProximity {
    fn name(&self) -> &str {
        "temporal_proximity"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64> {
        let timestamp = |node: &NodeRef| -> Result<chrono::DateTime<chrono::Utc>> {
            accessor.features(node)?.timestamp.ok_or_else(|| Error::MissingFeature {
                node: node.to_string(),
                feature: "timestamp",
            })
        };
        let gap = (timestamp(u)? - timestamp(v)?).abs();
        let ratio = gap.num_milliseconds() as f64 / self.half_life.num_milliseconds() as f64;
        Ok(0.5f64.powf(ratio))
    }

    fn spec(&self) -> MetricSpec {
        MetricSpec::new(self.name()).with_param("half_life_secs", self.half_life.num_seconds())
    }
}

// ── Composite ────────────────────────────────────────────────────────────────

/// Weighted sum of component metric scores.
///
/// The scale is the weighted combination of the component scales; with
/// non-negative weights summing to 1 over `[0, 1]` metrics the result stays in
/// `[0, 1]`. Weights appear in [`spec`](SimilarityMetric::spec).
#[derive(Clone)]
pub struct CompositeBlend {
    components: Vec<(Arc<dyn SimilarityMetric>, f64)>,
}

impl CompositeBlend {
    pub fn new(components: Vec<(Arc<dyn SimilarityMetric>, f64)>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::config("composite blend needs at least one component"));
        }
        if let Some((metric, weight)) = components.iter().find(|(_, w)| !w.is_finite()) {
            return Err(Error::config(format!(
                "blend weight for {} is not finite: {weight}",
                metric.name()
            )));
        }
        Ok(Self { components })
    }
}

impl SimilarityMetric for CompositeBlend {
    fn name(&self) -> &str {
        "composite_blend"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64> {
        let mut total = 0.0;
        for (metric, weight) in &self.components {
            total += weight * metric.similarity(u, v, accessor)?;
        }
        Ok(total)
    }

    fn spec(&self) -> MetricSpec {
        let components: Vec<serde_json::Value> = self
            .components
            .iter()
            .map(|(metric, weight)| {
                let spec = metric.spec();
                serde_json::json!({
                    "name": spec.name,
                    "params": spec.params,
                    "weight": weight,
                })
            })
            .collect();
        MetricSpec::new(self.name()).with_param("components", components)
    }

    fn is_symmetric(&self) -> bool {
        self.components.iter().all(|(m, _)| m.is_symmetric())
    }
}
