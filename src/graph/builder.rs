//! Exact similarity-edge construction.
//!
//! [`build_similarity_edges`] scores every ordered pair of nodes, selects
//! neighbors per source under a threshold and/or top-k policy, and
//! materializes the accepted pairs as [`Edge`]s.
//!
//! This path is O(n² · cost(metric)) time and O(n²) transient memory. It is
//! meant for small bootstrapping sets (tens to low hundreds of nodes); larger
//! sets should go through [`build_candidate_edges`](super::candidates::build_candidate_edges).

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::accessor::NodeAccessor;
use super::metrics::SimilarityMetric;
use super::types::{Edge, EdgeMeta, MetricSpec, NodeRef};
use crate::error::{Error, Result};

/// Weight given to the mirrored `v → u` edge of an undirected pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorWeight {
    /// Reuse the forward score `s(u, v)`. Only exact for symmetric metrics.
    #[default]
    Forward,
    /// Use the reverse score `s(v, u)`.
    Recompute,
}

/// How to turn similarity scores into edges.
///
/// At least one of `min_similarity` / `top_k` must be set. When both are set,
/// top-k ranks first and the threshold filters the ranked slots afterwards; a
/// dropped slot is not backfilled from the next candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEdgesConfig {
    /// Tag applied to every produced edge.
    pub edge_type: String,
    /// When false, each accepted pair yields both orientations.
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub min_similarity: Option<f64>,
    /// Per-source cap on outbound neighbors.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub mirror: MirrorWeight,
    /// Score matrix rows on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
}

impl BuildEdgesConfig {
    /// Undirected, forward-mirrored, no selection criterion yet.
    pub fn new(edge_type: impl Into<String>) -> Self {
        Self {
            edge_type: edge_type.into(),
            directed: false,
            min_similarity: None,
            top_k: None,
            mirror: MirrorWeight::Forward,
            parallel: false,
        }
    }

    pub fn with_min_similarity(mut self, threshold: f64) -> Self {
        self.min_similarity = Some(threshold);
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn directed(mut self, directed: bool) -> Self {
        self.directed = directed;
        self
    }

    pub fn with_mirror(mut self, mirror: MirrorWeight) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reject underspecified or invalid policies before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.edge_type.trim().is_empty() {
            return Err(Error::config("edge_type must not be empty"));
        }
        if self.min_similarity.is_none() && self.top_k.is_none() {
            return Err(Error::config("either min_similarity or top_k must be set"));
        }
        if self.top_k == Some(0) {
            return Err(Error::config("top_k must be positive"));
        }
        if let Some(t) = self.min_similarity {
            if !t.is_finite() {
                return Err(Error::config(format!("min_similarity must be finite, got {t}")));
            }
        }
        Ok(())
    }
}

/// Build similarity edges over `nodes` with the exact pairwise algorithm.
///
/// Self-pairs are never scored. A metric failure aborts the whole build; no
/// partial edge set is returned. `metric_spec`, when given, is attached to
/// every edge as [`EdgeMeta`].
pub fn build_similarity_edges(
    nodes: &[NodeRef],
    metric: &dyn SimilarityMetric,
    metric_spec: Option<&MetricSpec>,
    accessor: &dyn NodeAccessor,
    config: &BuildEdgesConfig,
) -> Result<Vec<Edge>> {
    config.validate()?;
    check_distinct(nodes)?;
    warn_if_asymmetric(metric, config);

    if nodes.len() <= 1 {
        return Ok(Vec::new());
    }

    tracing::debug!(
        nodes = nodes.len(),
        metric = metric.name(),
        top_k = ?config.top_k,
        min_similarity = ?config.min_similarity,
        directed = config.directed,
        parallel = config.parallel,
        "building similarity edges"
    );

    let scores = ScoreMatrix::compute(nodes, metric, accessor, config.parallel)?;

    let mut accepted = Vec::new();
    for i in 0..nodes.len() {
        let candidates: Vec<(usize, f64)> = (0..nodes.len())
            .filter(|&j| j != i)
            .map(|j| (j, scores.get(i, j)))
            .collect();
        accepted.extend(select_neighbors(candidates, config).into_iter().map(|(j, s)| (i, j, s)));
    }

    let edges = materialize(nodes, &accepted, config, metric_spec, |i, j| Ok(scores.get(j, i)))?;

    tracing::info!(
        nodes = nodes.len(),
        edges = edges.len(),
        edge_type = %config.edge_type,
        "similarity edges built"
    );
    Ok(edges)
}

/// Dense n×n score matrix. Diagonal cells are never scored.
struct ScoreMatrix {
    n: usize,
    cells: Vec<f64>,
}

impl ScoreMatrix {
    fn compute(
        nodes: &[NodeRef],
        metric: &dyn SimilarityMetric,
        accessor: &dyn NodeAccessor,
        parallel: bool,
    ) -> Result<Self> {
        let n = nodes.len();
        let rows: Vec<Result<Vec<f64>>> = if parallel {
            (0..n)
                .into_par_iter()
                .map(|i| score_row(i, nodes, metric, accessor))
                .collect()
        } else {
            (0..n).map(|i| score_row(i, nodes, metric, accessor)).collect()
        };

        // Report the first failing row in row order so errors are deterministic.
        let mut cells = Vec::with_capacity(n * n);
        for row in rows {
            cells.extend(row?);
        }
        Ok(Self { n, cells })
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.cells[i * self.n + j]
    }
}

fn score_row(
    i: usize,
    nodes: &[NodeRef],
    metric: &dyn SimilarityMetric,
    accessor: &dyn NodeAccessor,
) -> Result<Vec<f64>> {
    let mut row = vec![f64::NAN; nodes.len()];
    for (j, v) in nodes.iter().enumerate() {
        if j == i {
            continue;
        }
        row[j] = checked_score(&nodes[i], v, metric, accessor)?;
    }
    Ok(row)
}

/// Score one ordered pair, rejecting NaN and infinities.
pub(crate) fn checked_score(
    u: &NodeRef,
    v: &NodeRef,
    metric: &dyn SimilarityMetric,
    accessor: &dyn NodeAccessor,
) -> Result<f64> {
    let score = metric.similarity(u, v, accessor)?;
    if score.is_finite() {
        Ok(score)
    } else {
        Err(Error::NonFiniteScore {
            src: u.to_string(),
            dst: v.to_string(),
        })
    }
}

/// Apply the selection policy to one source's candidates.
///
/// `candidates` must be in original node-index order; the stable sort then
/// breaks score ties by that order.
pub(crate) fn select_neighbors(
    mut candidates: Vec<(usize, f64)>,
    config: &BuildEdgesConfig,
) -> Vec<(usize, f64)> {
    if let Some(k) = config.top_k {
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(k);
    }
    if let Some(threshold) = config.min_similarity {
        candidates.retain(|&(_, score)| score >= threshold);
    }
    candidates
}

/// Turn accepted `(src, dst, score)` index triples into edges.
///
/// Undirected configs add the mirrored edge, weighted per [`MirrorWeight`];
/// `reverse_score(i, j)` must return `s(nodes[j], nodes[i])`. An (src, dst)
/// pair already emitted in this build is skipped.
pub(crate) fn materialize(
    nodes: &[NodeRef],
    accepted: &[(usize, usize, f64)],
    config: &BuildEdgesConfig,
    metric_spec: Option<&MetricSpec>,
    mut reverse_score: impl FnMut(usize, usize) -> Result<f64>,
) -> Result<Vec<Edge>> {
    let meta = metric_spec.map(EdgeMeta::from);
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut edges = Vec::new();

    let mut push = |src: usize, dst: usize, weight: f64, edges: &mut Vec<Edge>| {
        if seen.insert((src, dst)) {
            edges.push(Edge {
                src: nodes[src].clone(),
                dst: nodes[dst].clone(),
                edge_type: config.edge_type.clone(),
                weight: Some(weight),
                meta: meta.clone(),
            });
        }
    };

    for &(i, j, score) in accepted {
        debug_assert_ne!(i, j);
        push(i, j, score, &mut edges);
        if !config.directed {
            let weight = match config.mirror {
                MirrorWeight::Forward => score,
                MirrorWeight::Recompute => reverse_score(i, j)?,
            };
            push(j, i, weight, &mut edges);
        }
    }
    Ok(edges)
}

/// A node listed twice would let the builder connect it to itself.
pub(crate) fn check_distinct(nodes: &[NodeRef]) -> Result<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node) {
            return Err(Error::config(format!("node set lists {node} more than once")));
        }
    }
    Ok(())
}

pub(crate) fn warn_if_asymmetric(metric: &dyn SimilarityMetric, config: &BuildEdgesConfig) {
    if !config.directed && config.mirror == MirrorWeight::Forward && !metric.is_symmetric() {
        tracing::warn!(
            metric = metric.name(),
            "asymmetric metric with undirected edges: mirrored weights reuse the forward score"
        );
    }
}
