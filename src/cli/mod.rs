pub mod edges;
pub mod search;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use emb::config::{IndexConfig, MetricConfig};
use emb::graph::{
    EmbeddingSimilarity, InMemoryAccessor, Layer, LexicalOverlap, NodeFeatures, NodeRef,
    SimilarityMetric, TemporalProximity,
};

/// One entry of a node input file.
#[derive(Debug, Deserialize)]
struct NodeInput {
    id: String,
    #[serde(default = "default_layer")]
    layer: Layer,
    #[serde(flatten)]
    features: NodeFeatures,
}

fn default_layer() -> Layer {
    Layer::Event
}

/// Read a JSON array of nodes. Order in the file is the node order the
/// builder sees, so ties resolve by file position.
pub fn load_nodes(path: &Path) -> Result<(Vec<NodeRef>, InMemoryAccessor)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read node file {}", path.display()))?;
    let inputs: Vec<NodeInput> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse node file {}", path.display()))?;

    let mut nodes = Vec::with_capacity(inputs.len());
    let mut accessor = InMemoryAccessor::new();
    for input in inputs {
        let node = NodeRef::new(input.id, input.layer);
        if accessor.insert(node.clone(), input.features).is_some() {
            bail!("node {node} appears more than once in {}", path.display());
        }
        nodes.push(node);
    }
    tracing::debug!(count = nodes.len(), path = %path.display(), "nodes loaded");
    Ok((nodes, accessor))
}

/// Build the metric named by `kind` (`lexical`, `cosine`, `dot`, `temporal`).
pub fn metric_from_config(kind: &str, config: &MetricConfig) -> Result<Arc<dyn SimilarityMetric>> {
    let metric: Arc<dyn SimilarityMetric> = match kind {
        "lexical" => {
            if config.lexical_fields.is_empty() {
                Arc::new(LexicalOverlap::new())
            } else {
                Arc::new(LexicalOverlap::over_fields(config.lexical_fields.iter().cloned()))
            }
        }
        "cosine" => Arc::new(EmbeddingSimilarity::cosine()),
        "dot" => Arc::new(EmbeddingSimilarity::inner_product()),
        "temporal" => {
            let secs = i64::try_from(config.temporal_half_life_secs)
                .context("temporal_half_life_secs out of range")?;
            Arc::new(TemporalProximity::new(chrono::Duration::seconds(secs))?)
        }
        other => bail!("unknown metric: {other}. Supported: lexical, cosine, dot, temporal"),
    };
    Ok(metric)
}

/// Copy of `base` with the backend overridden and the dimension taken from
/// the first node embedding, since the input file is the source of truth.
pub fn index_config_for(
    base: &IndexConfig,
    backend: Option<&str>,
    nodes: &[NodeRef],
    accessor: &InMemoryAccessor,
) -> Result<IndexConfig> {
    use emb::graph::NodeAccessor;

    let mut config = base.clone();
    if let Some(backend) = backend {
        config.backend = backend.to_string();
    }
    for node in nodes {
        if let Some(embedding) = &accessor.features(node)?.embedding {
            config.dimension = embedding.len();
            break;
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_nodes(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_nodes_reads_features_in_file_order() {
        let file = write_nodes(
            r#"[
                {"id": "b", "layer": "L2", "text": "retry with backoff", "embedding": [1.0, 0.0]},
                {"id": "a", "fields": {"goal": "ship"}, "timestamp": "2024-03-01T12:00:00Z"}
            ]"#,
        );
        let (nodes, accessor) = load_nodes(file.path()).unwrap();
        assert_eq!(nodes[0], NodeRef::new("b", Layer::Pattern));
        assert_eq!(nodes[1], NodeRef::new("a", Layer::Event));
        assert_eq!(accessor.len(), 2);
    }

    #[test]
    fn load_nodes_rejects_duplicates() {
        let file = write_nodes(r#"[{"id": "a"}, {"id": "a", "layer": "L1"}]"#);
        let err = load_nodes(file.path()).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn metric_kinds_resolve() {
        let config = MetricConfig::default();
        assert_eq!(metric_from_config("lexical", &config).unwrap().name(), "lexical_overlap");
        assert_eq!(metric_from_config("temporal", &config).unwrap().name(), "temporal_proximity");
        assert!(metric_from_config("cosine", &config).is_ok());
        assert!(metric_from_config("dot", &config).is_ok());
        assert!(metric_from_config("bm25", &config).is_err());
    }

    #[test]
    fn index_dimension_follows_embeddings() {
        let file = write_nodes(r#"[{"id": "x"}, {"id": "y", "embedding": [0.1, 0.2, 0.3]}]"#);
        let (nodes, accessor) = load_nodes(file.path()).unwrap();
        let config = index_config_for(&IndexConfig::default(), Some("ivf"), &nodes, &accessor).unwrap();
        assert_eq!(config.dimension, 3);
        assert_eq!(config.backend, "ivf");
    }
}
