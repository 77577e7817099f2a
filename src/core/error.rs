//! Error taxonomy for the query engine and storage layer

use thiserror::Error;

use crate::core::schema::EntityKind;

/// Errors surfaced by the entity query engine.
///
/// `UnknownEntity`, `UnsupportedOperator` and `InvalidFilter` are caller
/// errors and are never retried. `NotFound` is recoverable - callers treat
/// it as "no such record". `Storage` wraps the underlying SQLite failure.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown entity type: '{0}'")]
    UnknownEntity(String),

    #[error("unsupported filter operator: '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: i64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database schema version {found} does not match supported version {expected}")]
    SchemaMismatch { found: i32, expected: i32 },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;
