//! Vector index abstraction for approximate neighbor retrieval.
//!
//! A [`VectorIndex`] gives the edge builder a `search(query, top_k, filter)`
//! primitive so it can generate candidate neighbors instead of scoring every
//! pair. Backends differ in what they can do, and say so:
//!
//! | Backend | Search | Upsert | Delete | Filter |
//! |---------|--------|--------|--------|--------|
//! | [`FlatIndex`] | exact | append-only | unsupported | unsupported |
//! | [`IvfIndex`] | approximate (`nprobe` of `nlist` lists) | overwrite by id | yes | post-filter |
//! | [`SqliteVecIndex`] | exact KNN (sqlite-vec) | overwrite by id | yes | post-filter, L2 only |
//!
//! Unsupported operations fail with [`Error::UnsupportedOperation`]; a filter
//! is never silently ignored.

pub mod flat;
pub mod ivf;
pub mod sqlite_vec;

pub use flat::FlatIndex;
pub use ivf::{IvfIndex, IvfParams};
pub use sqlite_vec::SqliteVecIndex;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{check_dimension, Error, Result};

/// Filterable metadata attached to a vector record.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Native score of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMetric {
    /// Dot product; higher ranks first.
    #[serde(alias = "ip")]
    InnerProduct,
    /// Euclidean distance; lower ranks first.
    L2,
}

impl IndexMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InnerProduct => "ip",
            Self::L2 => "l2",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::InnerProduct)
    }

    pub(crate) fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::InnerProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
        }
    }

    /// `Less` when `a` ranks before `b`.
    pub(crate) fn rank(&self, a: f32, b: f32) -> Ordering {
        if self.higher_is_better() {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }
}

impl std::fmt::Display for IndexMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ip" | "inner_product" => Ok(Self::InnerProduct),
            "l2" => Ok(Self::L2),
            _ => Err(format!("unknown index metric: {s}")),
        }
    }
}

/// A vector bound to an id, with optional filterable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One search hit. `score` is in the backend's [`IndexMetric`] units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Conjunction of `key == value` constraints on record metadata.
///
/// An empty filter matches everything and counts as "no filter".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    terms: BTreeMap<String, serde_json::Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.terms.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Records without metadata match only the empty filter.
    pub fn matches(&self, metadata: Option<&Metadata>) -> bool {
        self.terms.iter().all(|(key, expected)| {
            metadata
                .and_then(|m| m.get(key))
                .is_some_and(|actual| actual == expected)
        })
    }
}

/// A nearest-neighbor index over fixed-dimension vectors.
///
/// Methods take `&self`; backends guard their state internally so a shared
/// index can serve concurrent searches while upserts and deletes run
/// exclusively.
pub trait VectorIndex: Send + Sync {
    /// Short backend name used in errors and logs.
    fn backend(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn metric(&self) -> IndexMetric;

    /// Number of stored records, counting duplicates in append-only backends.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Insert records. Whether an existing id is overwritten or duplicated is
    /// backend-specific. Any dimension mismatch rejects the whole batch before
    /// the index is touched.
    fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Remove records by id and return how many were removed.
    fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Up to `top_k` results in the backend's native order, ties broken by
    /// insertion order.
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchResult>>;
}

/// Validate every record's dimension before any state changes.
pub(crate) fn check_records(dimension: usize, records: &[VectorRecord]) -> Result<()> {
    records
        .iter()
        .try_for_each(|r| check_dimension(dimension, r.vector.len()))
}

/// Treat `Some(empty)` like `None`.
pub(crate) fn active_filter(filter: Option<&MetadataFilter>) -> Option<&MetadataFilter> {
    filter.filter(|f| !f.is_empty())
}

/// Build a backend from the `[index]` configuration section.
/// Every backend needs at least one component per vector.
pub(crate) fn check_index_dimension(dimension: usize) -> Result<()> {
    if dimension == 0 {
        return Err(Error::config("index dimension must be positive"));
    }
    Ok(())
}

pub fn create_index(config: &crate::config::IndexConfig) -> Result<Box<dyn VectorIndex>> {
    let metric: IndexMetric = config.metric.parse().map_err(Error::Configuration)?;
    match config.backend.as_str() {
        "flat" => Ok(Box::new(FlatIndex::new(config.dimension, metric)?)),
        "ivf" => {
            let params = IvfParams {
                nlist: config.nlist,
                nprobe: config.nprobe,
                ..IvfParams::default()
            };
            Ok(Box::new(IvfIndex::new(config.dimension, metric, params)?))
        }
        "sqlite-vec" => {
            if metric != IndexMetric::L2 {
                return Err(Error::unsupported("sqlite-vec", format!("metric {metric}")));
            }
            let index = match config.resolved_db_path() {
                Some(path) => SqliteVecIndex::open(path, config.dimension)?,
                None => SqliteVecIndex::in_memory(config.dimension)?,
            };
            Ok(Box::new(index))
        }
        other => Err(Error::config(format!(
            "unknown index backend: {other}. Supported: flat, ivf, sqlite-vec"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_scores_and_ranks() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        assert_eq!(IndexMetric::InnerProduct.score(&a, &b), 11.0);
        assert!((IndexMetric::L2.score(&a, &b) - 8.0f32.sqrt()).abs() < 1e-6);

        assert_eq!(IndexMetric::InnerProduct.rank(0.9, 0.1), Ordering::Less);
        assert_eq!(IndexMetric::L2.rank(0.9, 0.1), Ordering::Greater);
    }

    #[test]
    fn metric_parses_aliases() {
        assert_eq!("ip".parse::<IndexMetric>().unwrap(), IndexMetric::InnerProduct);
        assert_eq!("inner_product".parse::<IndexMetric>().unwrap(), IndexMetric::InnerProduct);
        assert_eq!("l2".parse::<IndexMetric>().unwrap(), IndexMetric::L2);
        assert!("cosine".parse::<IndexMetric>().is_err());
    }

    #[test]
    fn filter_matches_all_terms() {
        let mut meta = Metadata::new();
        meta.insert("layer".into(), "L1".into());
        meta.insert("label".into(), "success".into());

        assert!(MetadataFilter::new().matches(Some(&meta)));
        assert!(MetadataFilter::new().matches(None));
        assert!(MetadataFilter::new().with("layer", "L1").matches(Some(&meta)));
        assert!(!MetadataFilter::new()
            .with("layer", "L1")
            .with("label", "failure")
            .matches(Some(&meta)));
        assert!(!MetadataFilter::new().with("layer", "L1").matches(None));
    }

    #[test]
    fn create_index_rejects_unknown_backend() {
        let config = crate::config::IndexConfig {
            backend: "annoy".into(),
            ..Default::default()
        };
        let err = create_index(&config).err().unwrap();
        assert!(err.to_string().contains("unknown index backend"));
    }

    #[test]
    fn create_index_rejects_ip_for_sqlite_vec() {
        let config = crate::config::IndexConfig {
            backend: "sqlite-vec".into(),
            metric: "ip".into(),
            ..Default::default()
        };
        let err = create_index(&config).err().unwrap();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
    }

    #[test]
    fn create_index_builds_configured_backend() {
        let config = crate::config::IndexConfig {
            backend: "ivf".into(),
            dimension: 8,
            ..Default::default()
        };
        let index = create_index(&config).unwrap();
        assert_eq!(index.backend(), "ivf");
        assert_eq!(index.dimension(), 8);
        assert_eq!(index.metric(), IndexMetric::InnerProduct);
    }
}
