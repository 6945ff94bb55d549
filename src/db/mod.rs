pub mod schema;

use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

use crate::error::Result;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) an index database at `path` with sqlite-vec loaded and
/// the schema initialized for `dimension`-wide vectors.
pub fn open_database(path: impl AsRef<Path>, dimension: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::init_schema(&conn, dimension)?;

    tracing::info!(path = %path.display(), dimension, "index database initialized");
    Ok(conn)
}

/// Open a private in-memory index database.
pub fn open_memory_database(dimension: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory()?;
    schema::init_schema(&conn, dimension)?;
    Ok(conn)
}

/// Encode a vector as the little-endian f32 blob vec0 expects.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}
