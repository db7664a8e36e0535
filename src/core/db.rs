//! Database connection and initialization utilities.
//!
//! The registry store is a single SQLite database under the store root.
//! Writers are serialized through the lock registry in `writer`; readers
//! open plain connections and rely on WAL snapshot semantics.

use crate::core::error::ScribeError;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

/// Establish a SQLite connection with Scribe's standard configuration.
///
/// Enables:
/// - WAL (Write-Ahead Logging) mode for better concurrency
/// - Foreign key constraints
/// - 5-second busy timeout for lock contention
pub fn db_connect(db_path: &Path) -> Result<Connection, ScribeError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn registry_db_path(store: &Store) -> PathBuf {
    store.root.join(schemas::REGISTRY_DB_NAME)
}

/// Create the registry database and all tables if absent.
pub fn initialize_registry_db(store: &Store) -> Result<(), ScribeError> {
    let db_path = registry_db_path(store);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let conn = db_connect(&db_path)?;
    conn.execute(schemas::REGISTRY_SCHEMA_PROJECTS, [])?;
    conn.execute(schemas::REGISTRY_SCHEMA_DOCS, [])?;
    conn.execute(schemas::REGISTRY_INDEX_DOCS_PATH, [])?;
    conn.execute(schemas::REGISTRY_SCHEMA_DOC_CHANGES, [])?;
    conn.execute(schemas::REGISTRY_INDEX_CHANGES_DOC, [])?;
    conn.execute(schemas::REGISTRY_SCHEMA_LOG_MIRROR, [])?;
    conn.execute(schemas::REGISTRY_INDEX_MIRROR_LOG, [])?;
    conn.execute(schemas::REGISTRY_INDEX_MIRROR_ENTRY, [])?;
    Ok(())
}
