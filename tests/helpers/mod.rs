#![allow(dead_code)]

use std::collections::HashMap;

use emb::graph::{InMemoryAccessor, Layer, NodeAccessor, NodeFeatures, NodeRef, SimilarityMetric};
use emb::{Error, Result};

/// Event-layer nodes with the given ids, in order.
pub fn nodes(ids: &[&str]) -> Vec<NodeRef> {
    ids.iter().map(|id| NodeRef::new(*id, Layer::Event)).collect()
}

/// An accessor that knows every node but holds no feature data.
pub fn blank_accessor(nodes: &[NodeRef]) -> InMemoryAccessor {
    nodes
        .iter()
        .map(|n| (n.clone(), NodeFeatures::default()))
        .collect()
}

/// Deterministic `dim`-wide embedding with a spike at `seed` and a small
/// shared component so that every pair has a distinct positive cosine.
pub fn test_embedding(seed: usize, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim)
        .map(|d| ((seed * 31 + d * 7) % 13) as f32 / 130.0)
        .collect();
    v[seed % dim] += 1.0;
    v
}

/// `n` event nodes `n0..` carrying [`test_embedding`] vectors.
pub fn embedded_nodes(n: usize, dim: usize) -> (Vec<NodeRef>, InMemoryAccessor) {
    let nodes: Vec<NodeRef> = (0..n)
        .map(|i| NodeRef::new(format!("n{i}"), Layer::Event))
        .collect();
    let accessor = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), NodeFeatures::with_embedding(test_embedding(i, dim))))
        .collect();
    (nodes, accessor)
}

/// Metric backed by a fixed score table keyed by node id. Unlisted pairs
/// score 0.
pub struct TableMetric {
    scores: HashMap<(String, String), f64>,
    symmetric: bool,
}

impl TableMetric {
    /// Each `(a, b, s)` sets both `s(a, b)` and `s(b, a)`.
    pub fn symmetric(pairs: &[(&str, &str, f64)]) -> Self {
        let mut scores = HashMap::new();
        for &(a, b, s) in pairs {
            scores.insert((a.to_string(), b.to_string()), s);
            scores.insert((b.to_string(), a.to_string()), s);
        }
        Self {
            scores,
            symmetric: true,
        }
    }

    /// Each `(a, b, s)` sets only `s(a, b)`.
    pub fn directed(pairs: &[(&str, &str, f64)]) -> Self {
        let scores = pairs
            .iter()
            .map(|&(a, b, s)| ((a.to_string(), b.to_string()), s))
            .collect();
        Self {
            scores,
            symmetric: false,
        }
    }
}

impl SimilarityMetric for TableMetric {
    fn name(&self) -> &str {
        "table"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, accessor: &dyn NodeAccessor) -> Result<f64> {
        accessor.features(u)?;
        accessor.features(v)?;
        Ok(self
            .scores
            .get(&(u.id.clone(), v.id.clone()))
            .copied()
            .unwrap_or(0.0))
    }

    fn is_symmetric(&self) -> bool {
        self.symmetric
    }
}

/// Fails on one ordered pair, scores 0.5 everywhere else.
pub struct FailingMetric {
    pub src: String,
    pub dst: String,
}

impl SimilarityMetric for FailingMetric {
    fn name(&self) -> &str {
        "failing"
    }

    fn similarity(&self, u: &NodeRef, v: &NodeRef, _accessor: &dyn NodeAccessor) -> Result<f64> {
        if u.id == self.src && v.id == self.dst {
            Err(Error::MissingFeature {
                node: u.to_string(),
                feature: "embedding",
            })
        } else {
            Ok(0.5)
        }
    }
}

/// Always returns NaN.
pub struct NanMetric;

impl SimilarityMetric for NanMetric {
    fn name(&self) -> &str {
        "nan"
    }

    fn similarity(&self, _u: &NodeRef, _v: &NodeRef, _accessor: &dyn NodeAccessor) -> Result<f64> {
        Ok(f64::NAN)
    }
}

/// Ordered `(src id, dst id, weight)` triples for compact assertions.
pub fn triples(edges: &[emb::graph::Edge]) -> Vec<(String, String, f64)> {
    edges
        .iter()
        .map(|e| (e.src.id.clone(), e.dst.id.clone(), e.weight.unwrap_or(f64::NAN)))
        .collect()
}
