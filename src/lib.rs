#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! datastore-migrate - versioned migrations for repository datastores
//!
//! A repository keeps an encrypted SQLite datastore under `datastore/` and
//! a `repover` file holding the repository version. Each migration step
//! moves both forward (or backward) by one version: the schema changes in
//! a single transaction, the version file follows, and an optional
//! best-effort backfill derives new columns from documents already stored
//! in the datastore.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `sqlcipher` | Real at-rest encryption | `rusqlite/bundled-sqlcipher-vendored-openssl` |
//! | `cli` | The `dsmigrate` binary | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: datastore connection, transactional executor, schema introspection
//! - **[`ledger`]**: the repository version record
//! - **[`document`]**: typed view of stored contract documents
//! - **[`migration`]**: migration steps, stage pipelines, backfill, and the runner
//! - **[`config`]**: configuration management
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use datastore_migrate::{MigrationContext, MigrationRunner, NetworkMode};
//!
//! let ctx = MigrationContext::new("/path/to/repo", "passphrase", NetworkMode::Testnet);
//! let runner = MigrationRunner::default();
//!
//! println!("{}", runner.status(&ctx)?);
//! let version = runner.upgrade(&ctx)?;
//! ```
//!
//! Applying a single step directly:
//!
//! ```rust,ignore
//! use datastore_migrate::migration::{up, down, CoinColumns};
//!
//! up(&CoinColumns, &ctx)?;   // repover 9 -> 10, coin columns backfilled
//! down(&CoinColumns, &ctx)?; // repover 10 -> 9, coin columns dropped
//! ```

pub mod config;
pub mod database;
pub mod document;
mod error;
pub mod ledger;
pub mod migration;

pub use config::MigrateConfig;
pub use error::{DocumentError, LedgerError, MigrationError, Result};

pub use database::{DatabaseConn, NetworkMode, SchemaStatus, TableSchema};
pub use document::Contract;
pub use ledger::{FileLedger, VersionLedger};
pub use migration::{
    backfill, derive_coinset, BackfillSummary, BackfillTarget, CoinColumns, Coinset, Migration,
    MigrationContext, MigrationRunner, PipelineState,
};
