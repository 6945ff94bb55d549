//! SQL DDL for the persistent vector index.
//!
//! `vector_records` holds ids, insertion order and metadata; `vector_index`
//! is the sqlite-vec `vec0` table holding the vectors. The vec0 column width
//! is fixed at creation, so the dimension is recorded in `schema_meta` and
//! checked on every open.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vector_records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

fn vec_table_sql(dimension: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vector_index USING vec0(
            id TEXT PRIMARY KEY,
            embedding FLOAT[{dimension}]
        );"
    )
}

/// Create the tables if missing and verify the stored dimension.
pub fn init_schema(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'dimension'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(value) => {
            let expected: usize = value
                .parse()
                .map_err(|_| Error::config(format!("corrupt stored dimension: {value}")))?;
            if expected != dimension {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }
        None => {
            conn.execute(
                "INSERT INTO schema_meta (key, value) VALUES ('dimension', ?1)",
                params![dimension.to_string()],
            )?;
        }
    }

    conn.execute_batch(&vec_table_sql(dimension))?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        crate::db::load_sqlite_vec();
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = fresh();
        init_schema(&conn, 4).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"vector_records".to_string()));
        assert!(tables.contains(&"vector_index".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = fresh();
        init_schema(&conn, 4).unwrap();
        init_schema(&conn, 4).unwrap();
    }

    #[test]
    fn reopening_with_other_dimension_fails() {
        let conn = fresh();
        init_schema(&conn, 4).unwrap();
        let err = init_schema(&conn, 8).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 8
            }
        ));
    }
}
