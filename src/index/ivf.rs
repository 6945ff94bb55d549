//! Inverted-file (IVF) index.
//!
//! Vectors are partitioned into `nlist` lists around k-means centroids and a
//! query scans only the `nprobe` lists whose centroids rank best. Until the
//! index holds `nlist` vectors there is nothing to cluster, so records sit
//! in a single staging list and search is exact.
//!
//! Training is deterministic: centroids are seeded from evenly strided
//! records in insertion order and refined by Lloyd iterations until
//! assignments stop changing or `max_iterations` is reached. Vectors added
//! after training go to their nearest centroid; call [`IvfIndex::retrain`]
//! to re-cluster once the distribution has drifted.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
    active_filter, check_index_dimension, check_records, IndexMetric, Metadata, MetadataFilter,
    VectorIndex, VectorRecord, VectorSearchResult,
};
use crate::error::{check_dimension, Error, Result};

const BACKEND: &str = "ivf";

/// Partitioning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfParams {
    pub nlist: usize,
    pub nprobe: usize,
    pub max_iterations: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 16,
            nprobe: 4,
            max_iterations: 20,
        }
    }
}

impl IvfParams {
    fn validate(&self) -> Result<()> {
        if self.nlist == 0 {
            return Err(Error::config("ivf nlist must be positive"));
        }
        if self.nprobe == 0 || self.nprobe > self.nlist {
            return Err(Error::config(format!(
                "ivf nprobe must be in 1..={}, got {}",
                self.nlist, self.nprobe
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::config("ivf max_iterations must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    metadata: Option<Metadata>,
    /// Insertion order; kept across overwrites.
    seq: u64,
}

#[derive(Debug)]
struct IvfLists {
    /// Empty until trained.
    centroids: Vec<Vec<f32>>,
    /// One staging list while untrained, `nlist` lists afterwards.
    lists: Vec<Vec<Entry>>,
    locations: HashMap<String, (usize, usize)>,
    next_seq: u64,
}

impl IvfLists {
    fn new() -> Self {
        Self {
            centroids: Vec::new(),
            lists: vec![Vec::new()],
            locations: HashMap::new(),
            next_seq: 0,
        }
    }

    fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn len(&self) -> usize {
        self.locations.len()
    }

    fn remove(&mut self, id: &str) -> Option<Entry> {
        let (list, pos) = self.locations.remove(id)?;
        let entry = self.lists[list].swap_remove(pos);
        if let Some(moved) = self.lists[list].get(pos) {
            self.locations.insert(moved.id.clone(), (list, pos));
        }
        Some(entry)
    }

    fn place(&mut self, entry: Entry, metric: IndexMetric) {
        let list = if self.is_trained() {
            nearest_centroid(metric, &self.centroids, &entry.vector)
        } else {
            0
        };
        let pos = self.lists[list].len();
        self.locations.insert(entry.id.clone(), (list, pos));
        self.lists[list].push(entry);
    }

    fn train(&mut self, metric: IndexMetric, params: &IvfParams, dimension: usize) {
        let mut entries: Vec<Entry> = self.lists.drain(..).flatten().collect();
        entries.sort_by_key(|e| e.seq);

        let vectors: Vec<&[f32]> = entries.iter().map(|e| e.vector.as_slice()).collect();
        self.centroids = kmeans(&vectors, params.nlist, metric, params.max_iterations, dimension);
        self.lists = vec![Vec::new(); params.nlist];
        self.locations.clear();
        for entry in entries {
            self.place(entry, metric);
        }
    }

    /// Indices of the `n` lists to scan for `query`.
    fn probe_order(&self, metric: IndexMetric, query: &[f32], n: usize) -> Vec<usize> {
        if !self.is_trained() {
            return vec![0];
        }
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .map(|c| metric.score(query, c))
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| metric.rank(a.1, b.1));
        ranked.into_iter().take(n).map(|(list, _)| list).collect()
    }
}

fn nearest_centroid(metric: IndexMetric, centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = metric.score(vector, &centroids[0]);
    for (i, centroid) in centroids.iter().enumerate().skip(1) {
        let score = metric.score(vector, centroid);
        if metric.rank(score, best_score).is_lt() {
            best = i;
            best_score = score;
        }
    }
    best
}

/// Lloyd's k-means with strided seeding. Requires `vectors.len() >= k`.
fn kmeans(
    vectors: &[&[f32]],
    k: usize,
    metric: IndexMetric,
    max_iterations: usize,
    dimension: usize,
) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|c| vectors[c * n / k].to_vec()).collect();
    let mut assignments = vec![usize::MAX; n];

    for iteration in 0..max_iterations {
        let mut changed = false;
        for (slot, vector) in assignments.iter_mut().zip(vectors) {
            let best = nearest_centroid(metric, &centroids, vector);
            if *slot != best {
                *slot = best;
                changed = true;
            }
        }
        if !changed {
            tracing::trace!(iteration, "k-means converged");
            break;
        }

        let mut sums = vec![vec![0.0f32; dimension]; k];
        let mut counts = vec![0usize; k];
        for (&cluster, vector) in assignments.iter().zip(vectors) {
            counts[cluster] += 1;
            for (acc, x) in sums[cluster].iter_mut().zip(vector.iter()) {
                *acc += x;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // An empty cluster keeps its previous centroid.
            if count > 0 {
                *centroid = sum.into_iter().map(|x| x / count as f32).collect();
            }
        }
    }
    centroids
}

/// Approximate index over `nlist` inverted lists.
///
/// Upsert overwrites by id, delete is supported, and metadata filters are
/// applied exactly to the records found in the probed lists.
#[derive(Debug)]
pub struct IvfIndex {
    dimension: usize,
    metric: IndexMetric,
    params: IvfParams,
    inner: RwLock<IvfLists>,
}

impl IvfIndex {
    pub fn new(dimension: usize, metric: IndexMetric, params: IvfParams) -> Result<Self> {
        check_index_dimension(dimension)?;
        params.validate()?;
        Ok(Self {
            dimension,
            metric,
            params,
            inner: RwLock::new(IvfLists::new()),
        })
    }

    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.inner.read().is_trained()
    }

    /// Re-cluster every stored vector. A no-op while fewer than `nlist`
    /// vectors are stored.
    pub fn retrain(&self) {
        let mut lists = self.inner.write();
        if lists.len() >= self.params.nlist {
            lists.train(self.metric, &self.params, self.dimension);
            tracing::debug!(backend = BACKEND, count = lists.len(), "index retrained");
        }
    }
}

impl VectorIndex for IvfIndex {
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
        Ok(self.inner.read().len())
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        check_records(self.dimension, records)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut lists = self.inner.write();
        for record in records {
            let seq = match lists.remove(&record.id) {
                Some(previous) => previous.seq,
                None => {
                    lists.next_seq += 1;
                    lists.next_seq - 1
                }
            };
            lists.place(
                Entry {
                    id: record.id.clone(),
                    vector: record.vector.clone(),
                    metadata: record.metadata.clone(),
                    seq,
                },
                self.metric,
            );
        }

        if !lists.is_trained() && lists.len() >= self.params.nlist {
            lists.train(self.metric, &self.params, self.dimension);
            tracing::debug!(
                backend = BACKEND,
                nlist = self.params.nlist,
                count = lists.len(),
                "index trained"
            );
        }
        tracing::debug!(backend = BACKEND, count = records.len(), "records upserted");
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut lists = self.inner.write();
        let removed = ids.iter().filter(|id| lists.remove(id).is_some()).count();
        tracing::debug!(backend = BACKEND, removed, "records deleted");
        Ok(removed)
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchResult>> {
        check_dimension(self.dimension, query.len())?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let filter = active_filter(filter);

        let lists = self.inner.read();
        let mut hits: Vec<(f32, &Entry)> = lists
            .probe_order(self.metric, query, self.params.nprobe)
            .into_iter()
            .flat_map(|list| lists.lists[list].iter())
            .filter(|e| filter.map_or(true, |f| f.matches(e.metadata.as_ref())))
            .map(|e| (self.metric.score(query, &e.vector), e))
            .collect();
        hits.sort_by(|a, b| self.metric.rank(a.0, b.0).then(a.1.seq.cmp(&b.1.seq)));
        hits.truncate(top_k);

        Ok(hits
            .into_iter()
            .map(|(score, e)| VectorSearchResult {
                id: e.id.clone(),
                score,
                metadata: e.metadata.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;

    fn point(i: usize, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|d| ((i * 37 + d * 11) % 17) as f32 / 17.0)
            .collect()
    }

    fn params(nlist: usize, nprobe: usize) -> IvfParams {
        IvfParams {
            nlist,
            nprobe,
            ..IvfParams::default()
        }
    }

    fn layer_meta(layer: &str) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("layer".into(), layer.into());
        meta
    }

    #[test]
    fn rejects_bad_params() {
        assert!(IvfIndex::new(4, IndexMetric::L2, params(0, 0)).is_err());
        assert!(IvfIndex::new(4, IndexMetric::L2, params(4, 0)).is_err());
        assert!(IvfIndex::new(4, IndexMetric::L2, params(4, 5)).is_err());
    }

    #[test]
    fn exact_until_trained() {
        let index = IvfIndex::new(2, IndexMetric::L2, params(4, 1)).unwrap();
        index
            .upsert(&[
                VectorRecord::new("a", vec![0.0, 0.0]),
                VectorRecord::new("b", vec![5.0, 5.0]),
                VectorRecord::new("c", vec![1.0, 1.0]),
            ])
            .unwrap();
        assert!(!index.is_trained());

        let hits = index.search(&[0.9, 0.9], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn trains_once_nlist_vectors_exist() {
        let index = IvfIndex::new(3, IndexMetric::L2, params(4, 2)).unwrap();
        let records: Vec<_> = (0..10)
            .map(|i| VectorRecord::new(format!("v{i}"), point(i, 3)))
            .collect();
        index.upsert(&records).unwrap();
        assert!(index.is_trained());
        assert_eq!(index.len().unwrap(), 10);
    }

    #[test]
    fn full_probe_matches_flat() {
        let dim = 4;
        let ivf = IvfIndex::new(dim, IndexMetric::InnerProduct, params(4, 4)).unwrap();
        let flat = FlatIndex::new(dim, IndexMetric::InnerProduct).unwrap();
        let records: Vec<_> = (0..40)
            .map(|i| VectorRecord::new(format!("v{i}"), point(i, dim)))
            .collect();
        ivf.upsert(&records).unwrap();
        flat.upsert(&records).unwrap();

        for q in 0..5 {
            let query = point(q * 3 + 1, dim);
            let a: Vec<String> = ivf.search(&query, 5, None).unwrap().into_iter().map(|h| h.id).collect();
            let b: Vec<String> = flat.search(&query, 5, None).unwrap().into_iter().map(|h| h.id).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn training_is_deterministic() {
        let build = || {
            let index = IvfIndex::new(3, IndexMetric::L2, params(5, 2)).unwrap();
            let records: Vec<_> = (0..30)
                .map(|i| VectorRecord::new(format!("v{i}"), point(i, 3)))
                .collect();
            index.upsert(&records).unwrap();
            index.search(&point(7, 3), 6, None).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn upsert_overwrites_by_id() {
        let index = IvfIndex::new(2, IndexMetric::L2, params(2, 2)).unwrap();
        index
            .upsert(&[
                VectorRecord::new("a", vec![0.0, 0.0]),
                VectorRecord::new("b", vec![9.0, 9.0]),
            ])
            .unwrap();
        index.upsert(&[VectorRecord::new("a", vec![10.0, 10.0])]).unwrap();

        assert_eq!(index.len().unwrap(), 2);
        let hits = index.search(&[10.0, 10.0], 1, None).unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score.abs() < 1e-6);
    }

    #[test]
    fn delete_removes_records() {
        let index = IvfIndex::new(2, IndexMetric::L2, params(2, 2)).unwrap();
        index
            .upsert(&[
                VectorRecord::new("a", vec![0.0, 0.0]),
                VectorRecord::new("b", vec![1.0, 1.0]),
                VectorRecord::new("c", vec![2.0, 2.0]),
            ])
            .unwrap();

        let removed = index
            .delete(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.len().unwrap(), 2);
        let hits = index.search(&[0.0, 0.0], 3, None).unwrap();
        assert!(hits.iter().all(|h| h.id != "a"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn filter_restricts_results() {
        let index = IvfIndex::new(2, IndexMetric::InnerProduct, params(2, 2)).unwrap();
        index
            .upsert(&[
                VectorRecord::new("e1", vec![1.0, 0.0]).with_metadata(layer_meta("L1")),
                VectorRecord::new("p1", vec![1.0, 0.1]).with_metadata(layer_meta("L2")),
                VectorRecord::new("e2", vec![0.5, 0.5]).with_metadata(layer_meta("L1")),
                VectorRecord::new("bare", vec![1.0, 1.0]),
            ])
            .unwrap();

        let filter = MetadataFilter::new().with("layer", "L1");
        let hits = index.search(&[1.0, 0.0], 10, Some(&filter)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn mismatched_batch_leaves_index_unchanged() {
        let index = IvfIndex::new(128, IndexMetric::L2, IvfParams::default()).unwrap();
        index.upsert(&[VectorRecord::new("a", vec![0.0; 128])]).unwrap();
        let err = index
            .upsert(&[
                VectorRecord::new("b", vec![0.0; 128]),
                VectorRecord::new("c", vec![0.0; 64]),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 128,
                actual: 64
            }
        ));
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn retrain_below_nlist_is_noop() {
        let index = IvfIndex::new(2, IndexMetric::L2, params(8, 2)).unwrap();
        index.upsert(&[VectorRecord::new("a", vec![0.0, 0.0])]).unwrap();
        index.retrain();
        assert!(!index.is_trained());
        assert_eq!(index.search(&[0.0, 0.0], 1, None).unwrap()[0].id, "a");
    }
}
