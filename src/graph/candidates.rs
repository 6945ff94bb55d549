//! Index-backed edge construction.
//!
//! Instead of scoring all n² pairs, each source asks a [`VectorIndex`] for
//! its `candidates_per_node` nearest embeddings, rescores only those with
//! the configured metric, and applies the same selection and
//! materialization rules as the exact builder. With a flat index and
//! `candidates_per_node >= n - 1` the result equals
//! [`build_similarity_edges`](super::builder::build_similarity_edges).

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde_json::json;

use super::accessor::NodeAccessor;
use super::builder::{
    check_distinct, checked_score, materialize, select_neighbors, warn_if_asymmetric,
    BuildEdgesConfig,
};
use super::metrics::SimilarityMetric;
use super::types::{Edge, MetricSpec, NodeRef};
use crate::error::{Error, Result};
use crate::index::{Metadata, VectorIndex, VectorRecord};

/// Upsert the embedding of every node into `index` under
/// [`NodeRef::index_key`], tagged with `layer` and `id` metadata.
///
/// Fails with `MissingFeature` before touching the index if any node lacks
/// an embedding.
pub fn index_nodes(
    index: &dyn VectorIndex,
    nodes: &[NodeRef],
    accessor: &dyn NodeAccessor,
) -> Result<usize> {
    let records = nodes
        .iter()
        .map(|node| {
            let vector = embedding_of(node, accessor)?;
            let mut metadata = Metadata::new();
            metadata.insert("layer".into(), json!(node.layer.as_str()));
            metadata.insert("id".into(), json!(node.id));
            Ok(VectorRecord::new(node.index_key(), vector).with_metadata(metadata))
        })
        .collect::<Result<Vec<_>>>()?;

    index.upsert(&records)?;
    tracing::debug!(backend = index.backend(), count = records.len(), "nodes indexed");
    Ok(records.len())
}

/// Build similarity edges from index candidates.
///
/// `nodes` must already be in `index` (see [`index_nodes`]); hits whose key
/// is not one of `nodes` are ignored. Query vectors come from each node's
/// stored embedding.
pub fn build_candidate_edges(
    nodes: &[NodeRef],
    metric: &dyn SimilarityMetric,
    metric_spec: Option<&MetricSpec>,
    accessor: &dyn NodeAccessor,
    index: &dyn VectorIndex,
    config: &BuildEdgesConfig,
    candidates_per_node: usize,
) -> Result<Vec<Edge>> {
    config.validate()?;
    if candidates_per_node == 0 {
        return Err(Error::config("candidates_per_node must be positive"));
    }
    check_distinct(nodes)?;
    warn_if_asymmetric(metric, config);

    if nodes.len() <= 1 {
        return Ok(Vec::new());
    }

    tracing::debug!(
        nodes = nodes.len(),
        metric = metric.name(),
        backend = index.backend(),
        candidates_per_node,
        "building candidate edges"
    );

    let positions: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.index_key(), i))
        .collect();

    let row = |i: usize| {
        candidate_row(i, nodes, &positions, metric, accessor, index, config, candidates_per_node)
    };
    let rows: Vec<Result<Vec<(usize, usize, f64)>>> = if config.parallel {
        (0..nodes.len()).into_par_iter().map(row).collect()
    } else {
        (0..nodes.len()).map(row).collect()
    };

    let mut accepted = Vec::new();
    for row in rows {
        accepted.extend(row?);
    }

    let edges = materialize(nodes, &accepted, config, metric_spec, |i, j| {
        checked_score(&nodes[j], &nodes[i], metric, accessor)
    })?;

    tracing::info!(
        nodes = nodes.len(),
        edges = edges.len(),
        edge_type = %config.edge_type,
        "candidate edges built"
    );
    Ok(edges)
}

#[allow(clippy::too_many_arguments)]
fn candidate_row(
    i: usize,
    nodes: &[NodeRef],
    positions: &HashMap<String, usize>,
    metric: &dyn SimilarityMetric,
    accessor: &dyn NodeAccessor,
    index: &dyn VectorIndex,
    config: &BuildEdgesConfig,
    candidates_per_node: usize,
) -> Result<Vec<(usize, usize, f64)>> {
    let query = embedding_of(&nodes[i], accessor)?;
    // One extra slot since the source usually finds itself.
    let hits = index.search(&query, candidates_per_node.saturating_add(1), None)?;

    let mut seen = HashSet::new();
    let mut targets: Vec<usize> = hits
        .iter()
        .filter_map(|hit| positions.get(&hit.id).copied())
        .filter(|&j| j != i && seen.insert(j))
        .take(candidates_per_node)
        .collect();
    targets.sort_unstable();

    let candidates = targets
        .into_iter()
        .map(|j| Ok((j, checked_score(&nodes[i], &nodes[j], metric, accessor)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(select_neighbors(candidates, config)
        .into_iter()
        .map(|(j, score)| (i, j, score))
        .collect())
}

fn embedding_of(node: &NodeRef, accessor: &dyn NodeAccessor) -> Result<Vec<f32>> {
    accessor
        .features(node)?
        .embedding
        .clone()
        .ok_or_else(|| Error::MissingFeature {
            node: node.to_string(),
            feature: "embedding",
        })
}
