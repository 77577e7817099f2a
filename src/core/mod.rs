//! Core module - fundamental types and utilities

pub mod config;
pub mod error;
pub mod schema;
pub mod value;
pub mod week;

pub use config::Config;
pub use error::{QueryError, QueryResult};
pub use schema::{EntityKind, EntitySchema, FieldDef, FieldType};
pub use value::{Link, Record, Value};
