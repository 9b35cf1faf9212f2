//! Datastore module
//!
//! ```text
//! database/
//! └── core/           # Foundation
//!     ├── connection  # DatabaseConn wrapper, network-mode file layout, transactions
//!     └── schema      # Table introspection and repository status
//! ```
//!
//! Each repository keeps one datastore per network under
//! `{repo}/datastore/`. The datastore may be encrypted with SQLCipher, in
//! which case the passphrase is applied when the connection is opened.
//!
//! # Usage
//!
//! ```rust,ignore
//! use datastore_migrate::database::{DatabaseConn, NetworkMode};
//!
//! let db = DatabaseConn::open_repo(repo_path, "passphrase", NetworkMode::Testnet)?;
//! db.execute_in_transaction(&["ALTER TABLE sales ADD COLUMN note text DEFAULT '';"])?;
//! ```

pub mod core;

pub use core::{datastore_path, DatabaseConn, NetworkMode, SchemaStatus, TableSchema, DATASTORE_DIR};
