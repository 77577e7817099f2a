//! SQLite-backed entity store
//!
//! [`Store`] owns the database connection and carries the whole query
//! engine: generic `find`/`find_one`/`create`/`update`/`delete` over the
//! declared entity schema, with filters compiled to SQL and results
//! serialized to link-normalized records. The handle is constructed once
//! at process start and passed to the layers that need it - there is no
//! ambient global client.

mod engine;
mod filter;
mod resolve;
mod schema;

pub use engine::{Direction, FindOptions, OrderSpec, SummaryKind, SummarySpec};
pub use filter::{CompareOp, Filter, GroupOp};

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::core::error::{QueryError, QueryResult};
use crate::core::schema as entity_schema;

/// Current schema version - opening a database written by a different
/// version is a hard error; this file is the system of record, not a
/// rebuildable cache, and migrations are out of scope.
const SCHEMA_VERSION: i32 = 3;

/// The entity store backed by SQLite
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a tracking database at the given path
    pub fn open(path: &Path) -> QueryResult<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opening store");
        Self::from_connection(conn)
    }

    /// Open a private in-memory store (tests, scratch sessions)
    pub fn open_in_memory() -> QueryResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> QueryResult<Self> {
        entity_schema::validate().map_err(QueryError::Validation)?;

        // WAL for concurrent readers; foreign keys drive the cascade and
        // nullify rules declared in the DDL.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self { conn };
        match store.schema_version()? {
            0 => store.init_schema()?,
            v if v == SCHEMA_VERSION => {}
            v => {
                return Err(QueryError::SchemaMismatch { found: v, expected: SCHEMA_VERSION });
            }
        }

        Ok(store)
    }

    /// Schema version of the opened database, 0 for a fresh file
    fn schema_version(&self) -> QueryResult<i32> {
        let has_table: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        if has_table == 0 {
            return Ok(0);
        }
        let version: Option<i32> = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(version.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_initializes_schema() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_open_existing_file_keeps_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.db");
        drop(Store::open(&path).unwrap());
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.db");
        drop(Store::open(&path).unwrap());

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE schema_version SET version = 99", []).unwrap();
        drop(conn);

        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, QueryError::SchemaMismatch { found: 99, .. }));
    }
}
