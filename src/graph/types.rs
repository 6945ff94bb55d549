//! Identity and relation primitives.
//!
//! Defines [`Layer`] (the abstraction tier of a node), [`NodeRef`] (node
//! identity), [`Edge`] (a directed, typed relation), and [`MetricSpec`] (the
//! audit record of which metric produced a batch of edges).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Abstraction tier of a node. Ordered from raw events up to principles.
///
/// Layers inform edge formation but do not restrict it: cross-layer edges
/// such as "pattern summarizes event" are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Raw experience events (situation, goal, attempt, result, reflection).
    #[serde(rename = "L1", alias = "event")]
    Event,
    /// Recurring patterns distilled from several events.
    #[serde(rename = "L2", alias = "pattern")]
    Pattern,
    /// General principles distilled from patterns.
    #[serde(rename = "L3", alias = "principle")]
    Principle,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "L1",
            Self::Pattern => "L2",
            Self::Principle => "L3",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L1" | "event" => Ok(Self::Event),
            "L2" | "pattern" => Ok(Self::Pattern),
            "L3" | "principle" => Ok(Self::Principle),
            _ => Err(format!("unknown layer: {s}")),
        }
    }
}

/// Lightweight, immutable reference to a graph node. Equal by (id, layer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    pub layer: Layer,
}

impl NodeRef {
    pub fn new(id: impl Into<String>, layer: Layer) -> Self {
        Self {
            id: id.into(),
            layer,
        }
    }

    /// Key under which this node's vector is stored in a vector index.
    ///
    /// The layer prefix keeps nodes with the same id on different layers apart.
    pub fn index_key(&self) -> String {
        format!("{}:{}", self.layer, self.id)
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.layer, self.id)
    }
}

/// Serializable description of a metric configuration.
///
/// Recorded on edges for auditability and to regenerate edges later. Never
/// consulted by the scoring logic itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Provenance attached to a generated edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMeta {
    /// Name of the metric that scored the pair.
    pub metric: String,
    /// Parameters of that metric, copied from its [`MetricSpec`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_params: BTreeMap<String, serde_json::Value>,
}

impl From<&MetricSpec> for EdgeMeta {
    fn from(spec: &MetricSpec) -> Self {
        Self {
            metric: spec.name.clone(),
            metric_params: spec.params.clone(),
        }
    }
}

/// A directed, typed relation between two nodes.
///
/// Edges are value objects. Undirected relations are materialized as two
/// edges, one per orientation, carrying the same weight and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeRef,
    pub dst: NodeRef,
    /// Relation tag, e.g. `"similar"`, `"contradicts"`, `"refines"`.
    pub edge_type: String,
    /// Similarity score when the edge came from a metric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EdgeMeta>,
}
