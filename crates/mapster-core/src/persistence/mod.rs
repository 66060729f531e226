//! Persistence layer for maps and memberships
//!
//! Provides the SQLite-backed [`Storage`](crate::store::Storage) implementation.

mod schema;
mod sqlite;

pub use schema::{Schema, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;
