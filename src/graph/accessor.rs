//! Read-only access to node feature data.
//!
//! Metrics never see the storage representation of a node. They ask a
//! [`NodeAccessor`] for the node's [`NodeFeatures`], which the caller's
//! storage layer supplies.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::NodeRef;
use crate::error::{Error, Result};

/// The slice of a normalized experience record that metrics read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFeatures {
    /// Free text for the node (e.g. a summary or the raw attempt).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Named text slots such as `situation`, `goal`, `attempt`, `result`, `reflection`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    /// Precomputed dense embedding, if the producer attached one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Prior artifacts referenced by the experience (paths, URLs, ids).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    /// Outcome label: `success`, `failure`, or `unknown`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl NodeFeatures {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..Default::default()
        }
    }

    /// All text of the node: `text` followed by every field in key order.
    pub fn full_text(&self) -> String {
        self.text
            .iter()
            .map(String::as_str)
            .chain(self.fields.values().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Resolves a node to its feature data.
///
/// Implementations must be side-effect free from the caller's point of view;
/// the builder may call `features` from several threads at once.
pub trait NodeAccessor: Send + Sync {
    fn features(&self, node: &NodeRef) -> Result<Cow<'_, NodeFeatures>>;
}

/// A [`NodeAccessor`] over an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccessor {
    nodes: HashMap<NodeRef, NodeFeatures>,
}

impl InMemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: NodeRef, features: NodeFeatures) -> Option<NodeFeatures> {
        self.nodes.insert(node, features)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl FromIterator<(NodeRef, NodeFeatures)> for InMemoryAccessor {
    fn from_iter<I: IntoIterator<Item = (NodeRef, NodeFeatures)>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl NodeAccessor for InMemoryAccessor {
    fn features(&self, node: &NodeRef) -> Result<Cow<'_, NodeFeatures>> {
        self.nodes
            .get(node)
            .map(Cow::Borrowed)
            .ok_or_else(|| Error::NodeNotFound(node.to_string()))
    }
}
