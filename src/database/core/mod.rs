//! Core datastore infrastructure
//!
//! This module provides the foundational datastore components used by every migration:
//! - `DatabaseConn`: SQLite/SQLCipher connection wrapper with the transactional executor
//! - `TableSchema`: live table shape introspection
//! - `SchemaStatus`: repository state relative to the known migrations

mod connection;
mod schema;

pub use connection::{datastore_path, DatabaseConn, NetworkMode, DATASTORE_DIR};
pub use schema::{SchemaStatus, TableSchema};
