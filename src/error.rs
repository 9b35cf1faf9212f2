//! Error types for datastore migrations
//!
//! Every failure a migration can hit maps to one [`MigrationError`] variant.
//! Errors are returned unchanged to the caller of `up`/`down`; nothing in
//! this crate retries on its own.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors raised while migrating a repository datastore
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The datastore could not be opened or unlocked
    #[error("failed to open datastore at '{}': {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A DDL statement failed; the schema transaction was rolled back
    #[error("schema change for version {version} failed: {source}")]
    Schema {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// The repository version record could not be read or written
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A stored document could not be decoded during backfill
    #[error("failed to decode document for row '{id}' in table '{table}': {source}")]
    Decode {
        table: String,
        id: String,
        #[source]
        source: DocumentError,
    },

    /// Reading rows for backfill failed
    #[error("failed to read rows from table '{table}': {source}")]
    BackfillRead {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The derived-value update transaction failed and was rolled back
    #[error("failed to write derived values to table '{table}': {source}")]
    BackfillWrite {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The datastore already has the shape of the next version but the
    /// ledger was never advanced
    #[error(
        "datastore schema is ahead of repository version {ledger_version}; manual recovery required"
    )]
    Inconsistent { ledger_version: u32 },

    /// The repository is newer than every migration this build knows
    #[error(
        "repository version {ledger_version} is newer than the latest supported version {supported_version}"
    )]
    Incompatible {
        ledger_version: u32,
        supported_version: u32,
    },

    /// A step's backfill was requested before the step was applied
    #[error("migration to version {version} is not applied (repository is at {ledger_version})")]
    NotApplied { version: u32, ledger_version: u32 },

    /// No registered migration step leads away from this version
    #[error("no migration step registered for version {version}")]
    MissingStep { version: u32 },

    /// The migration registry itself is malformed
    #[error("invalid migration registry: {0}")]
    Registry(String),
}

/// Errors from the repository version record
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("repository version file not found at '{}'", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read repository version file '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("repository version file '{}' holds '{content}', not a version number", path.display())]
    Malformed { path: PathBuf, content: String },

    #[error("failed to write repository version file '{}': {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from decoding a stored contract document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("malformed contract JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document column holds {0}, not text")]
    NotText(rusqlite::types::Type),
}
