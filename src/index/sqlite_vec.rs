//! Persistent index on SQLite with the sqlite-vec extension.
//!
//! Vectors live in a `vec0` virtual table and ids, insertion order and
//! metadata in a plain side table (see [`crate::db::schema`]). Unfiltered
//! queries use the native KNN operator; filtered queries scan every row with
//! `vec_distance_l2` and filter in Rust so no match is lost to a KNN cutoff.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::{
    active_filter, check_index_dimension, check_records, IndexMetric, Metadata, MetadataFilter,
    VectorIndex, VectorRecord, VectorSearchResult,
};
use crate::db;
use crate::error::{check_dimension, Result};

const BACKEND: &str = "sqlite-vec";

/// Upper bound sqlite-vec accepts for a KNN `LIMIT`.
const KNN_MAX_K: usize = 4096;

/// L2 index stored in a SQLite database. Upsert overwrites by id and delete
/// removes rows for real.
#[derive(Debug)]
pub struct SqliteVecIndex {
    dimension: usize,
    conn: Mutex<Connection>,
}

struct StoredRow {
    seq: i64,
    metadata: Option<Metadata>,
}

impl StoredRow {
    fn new(seq: i64, metadata: Option<String>) -> Result<Self> {
        let metadata = metadata
            .map(|text| serde_json::from_str::<Metadata>(&text))
            .transpose()?;
        Ok(Self { seq, metadata })
    }
}

impl SqliteVecIndex {
    /// Open or create an on-disk index. Reopening with a different dimension
    /// fails with `DimensionMismatch`.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        check_index_dimension(dimension)?;
        Ok(Self {
            dimension,
            conn: Mutex::new(db::open_database(path, dimension)?),
        })
    }

    pub fn in_memory(dimension: usize) -> Result<Self> {
        check_index_dimension(dimension)?;
        Ok(Self {
            dimension,
            conn: Mutex::new(db::open_memory_database(dimension)?),
        })
    }

    fn knn(conn: &Connection, query: &[f32], k: usize) -> Result<Vec<(String, f64)>> {
        let mut stmt = conn.prepare(
            "SELECT id, distance FROM vector_index \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![db::vector_to_blob(query), k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distance to every stored vector, joined with its side-table row.
    fn scan(conn: &Connection, query: &[f32]) -> Result<Vec<(String, f64, StoredRow)>> {
        let mut stmt = conn.prepare(
            "SELECT v.id, vec_distance_l2(v.embedding, ?1), r.seq, r.metadata \
             FROM vector_index v JOIN vector_records r ON r.id = v.id",
        )?;
        let raw = stmt
            .query_map(params![db::vector_to_blob(query)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, distance, seq, metadata)| {
                Ok((id, distance, StoredRow::new(seq, metadata)?))
            })
            .collect()
    }

    /// Batch-fetch insertion order and metadata for a KNN result. `ids` is
    /// bounded by `KNN_MAX_K`, well under SQLite's variable limit.
    fn fetch_rows(conn: &Connection, ids: &[&str]) -> Result<HashMap<String, StoredRow>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT id, seq, metadata FROM vector_records WHERE id IN ({})",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

        let raw = stmt
            .query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut map = HashMap::with_capacity(raw.len());
        for (id, seq, metadata) in raw {
            map.insert(id, StoredRow::new(seq, metadata)?);
        }
        Ok(map)
    }
}

impl VectorIndex for SqliteVecIndex {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> IndexMetric {
        IndexMetric::L2
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vector_records", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        check_records(self.dimension, records)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for record in records {
            let metadata = record
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            // Existing ids keep their seq so tie order stays stable.
            tx.execute(
                "INSERT INTO vector_records (id, metadata) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET metadata = excluded.metadata",
                params![record.id, metadata],
            )?;
            tx.execute("DELETE FROM vector_index WHERE id = ?1", params![record.id])?;
            tx.execute(
                "INSERT INTO vector_index (id, embedding) VALUES (?1, ?2)",
                params![record.id, db::vector_to_blob(&record.vector)],
            )?;
        }
        tx.commit()?;

        tracing::debug!(backend = BACKEND, count = records.len(), "records upserted");
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute("DELETE FROM vector_records WHERE id = ?1", params![id])?;
            tx.execute("DELETE FROM vector_index WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

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

        let conn = self.conn.lock();
        let rows = if filter.is_none() && top_k <= KNN_MAX_K {
            let distances = Self::knn(&conn, query, top_k)?;
            let ids: Vec<&str> = distances.iter().map(|(id, _)| id.as_str()).collect();
            let mut stored = Self::fetch_rows(&conn, &ids)?;
            distances
                .into_iter()
                .filter_map(|(id, distance)| {
                    let row = stored.remove(&id)?;
                    Some((id, distance, row))
                })
                .collect()
        } else {
            Self::scan(&conn, query)?
        };
        drop(conn);

        let mut hits: Vec<(f64, i64, VectorSearchResult)> = rows
            .into_iter()
            .map(|(id, distance, row)| {
                (
                    distance,
                    row.seq,
                    VectorSearchResult {
                        id,
                        score: distance as f32,
                        metadata: row.metadata,
                    },
                )
            })
            .filter(|(_, _, hit)| filter.map_or(true, |f| f.matches(hit.metadata.as_ref())))
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.truncate(top_k);

        Ok(hits.into_iter().map(|(_, _, hit)| hit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn layer_meta(layer: &str) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("layer".into(), layer.into());
        meta
    }

    fn seeded() -> SqliteVecIndex {
        let index = SqliteVecIndex::in_memory(2).unwrap();
        index
            .upsert(&[
                VectorRecord::new("a", vec![0.0, 0.0]).with_metadata(layer_meta("L1")),
                VectorRecord::new("b", vec![3.0, 4.0]).with_metadata(layer_meta("L2")),
                VectorRecord::new("c", vec![1.0, 0.0]).with_metadata(layer_meta("L1")),
            ])
            .unwrap();
        index
    }

    #[test]
    fn knn_orders_by_distance() {
        let hits = seeded().search(&[0.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((hits[2].score - 5.0).abs() < 1e-5);
        assert_eq!(hits[0].metadata, Some(layer_meta("L1")));
    }

    #[test]
    fn filtered_search_scans_and_filters() {
        let index = seeded();
        let filter = MetadataFilter::new().with("layer", "L2");
        let hits = index.search(&[0.0, 0.0], 1, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn upsert_overwrites_and_delete_removes() {
        let index = seeded();
        index.upsert(&[VectorRecord::new("b", vec![0.0, 0.1])]).unwrap();
        assert_eq!(index.len().unwrap(), 3);
        let hits = index.search(&[0.0, 0.1], 1, None).unwrap();
        assert_eq!(hits[0].id, "b");
        assert_eq!(hits[0].metadata, None);

        let removed = index.delete(&["b".to_string(), "nope".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.len().unwrap(), 2);
        let hits = index.search(&[0.0, 0.1], 3, None).unwrap();
        assert!(hits.iter().all(|h| h.id != "b"));
    }

    #[test]
    fn dimension_mismatch_rejects_batch() {
        let index = seeded();
        let err = index
            .upsert(&[
                VectorRecord::new("d", vec![1.0, 1.0]),
                VectorRecord::new("e", vec![1.0]),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1 }));
        assert_eq!(index.len().unwrap(), 3);

        assert!(matches!(
            index.search(&[1.0], 1, None).unwrap_err(),
            Error::DimensionMismatch { .. }
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let index = SqliteVecIndex::open(&path, 2).unwrap();
            index.upsert(&[VectorRecord::new("kept", vec![1.0, 2.0])]).unwrap();
        }
        let index = SqliteVecIndex::open(&path, 2).unwrap();
        assert_eq!(index.len().unwrap(), 1);
        assert_eq!(index.search(&[1.0, 2.0], 1, None).unwrap()[0].id, "kept");

        assert!(matches!(
            SqliteVecIndex::open(&path, 3).unwrap_err(),
            Error::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }
}
