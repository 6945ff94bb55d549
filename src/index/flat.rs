//! Exact brute-force index.

use parking_lot::RwLock;

use super::{
    active_filter, check_index_dimension, check_records, IndexMetric, Metadata, MetadataFilter,
    VectorIndex, VectorRecord, VectorSearchResult,
};
use crate::error::{check_dimension, Error, Result};

const BACKEND: &str = "flat";

/// Exact search over every stored vector.
///
/// Storage is append-only: upserting an existing id adds a second record
/// with the same id rather than replacing the first, and neither `delete`
/// nor metadata filtering is supported. Use [`FlatIndex::rebuild`] to
/// replace the contents wholesale.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    metric: IndexMetric,
    inner: RwLock<FlatStore>,
}

#[derive(Debug, Default)]
struct FlatStore {
    ids: Vec<String>,
    /// Row-major, `ids.len() * dimension` values.
    vectors: Vec<f32>,
    metadata: Vec<Option<Metadata>>,
}

impl FlatStore {
    fn push(&mut self, record: &VectorRecord) {
        self.ids.push(record.id.clone());
        self.vectors.extend_from_slice(&record.vector);
        self.metadata.push(record.metadata.clone());
    }
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: IndexMetric) -> Result<Self> {
        check_index_dimension(dimension)?;
        Ok(Self {
            dimension,
            metric,
            inner: RwLock::new(FlatStore::default()),
        })
    }

    /// Replace every stored record with `records`.
    pub fn rebuild(&self, records: &[VectorRecord]) -> Result<()> {
        check_records(self.dimension, records)?;
        let mut store = FlatStore::default();
        for record in records {
            store.push(record);
        }
        *self.inner.write() = store;
        tracing::debug!(backend = BACKEND, count = records.len(), "index rebuilt");
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> IndexMetric {
        self.metric
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().ids.len())
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        check_records(self.dimension, records)?;
        if records.is_empty() {
            return Ok(());
        }
        let mut store = self.inner.write();
        for record in records {
            store.push(record);
        }
        tracing::debug!(backend = BACKEND, count = records.len(), "records appended");
        Ok(())
    }

    fn delete(&self, _ids: &[String]) -> Result<usize> {
        Err(Error::unsupported(BACKEND, "delete"))
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchResult>> {
        if active_filter(filter).is_some() {
            return Err(Error::unsupported(BACKEND, "metadata filter"));
        }
        check_dimension(self.dimension, query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let store = self.inner.read();
        let mut scored: Vec<(usize, f32)> = store
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| self.metric.score(query, row))
            .enumerate()
            .collect();
        // Stable sort keeps insertion order among ties.
        scored.sort_by(|a, b| self.metric.rank(a.1, b.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| VectorSearchResult {
                id: store.ids[row].clone(),
                score,
                metadata: store.metadata[row].clone(),
            })
            .collect())
    }
}
