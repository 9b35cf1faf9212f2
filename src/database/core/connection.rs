//! Datastore connection management
//!
//! This module provides the connection wrapper every migration step opens,
//! plus the transactional executor used for both DDL and backfill writes.

use crate::error::{MigrationError, Result};
use rusqlite::{Connection, Params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the repository root holding the datastore files
pub const DATASTORE_DIR: &str = "datastore";

/// Which network a repository belongs to
///
/// Mainnet and testnet repositories keep separate datastore files side by
/// side in the same repository directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Mainnet,
    Testnet,
}

impl NetworkMode {
    /// Map the runner's boolean testnet flag to a mode
    pub fn from_testnet(testnet: bool) -> Self {
        if testnet {
            NetworkMode::Testnet
        } else {
            NetworkMode::Mainnet
        }
    }

    /// File name of the datastore for this network
    pub fn db_file_name(&self) -> &'static str {
        match self {
            NetworkMode::Mainnet => "mainnet.db",
            NetworkMode::Testnet => "testnet.db",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Mainnet => write!(f, "mainnet"),
            NetworkMode::Testnet => write!(f, "testnet"),
        }
    }
}

/// Path of the datastore file for a repository
pub fn datastore_path(repo_path: &Path, network: NetworkMode) -> PathBuf {
    repo_path.join(DATASTORE_DIR).join(network.db_file_name())
}

/// Core datastore connection wrapper
///
/// `DatabaseConn` owns a single SQLite (or SQLCipher) connection for the
/// duration of a migration. Unlocking happens at open time so that a wrong
/// passphrase surfaces as a connection error rather than a schema error.
pub struct DatabaseConn {
    pub conn: Connection,
    path: Option<PathBuf>,
}

impl DatabaseConn {
    /// Open the datastore of a repository
    ///
    /// The file lives at `{repo}/datastore/{mainnet,testnet}.db`.
    pub fn open_repo(repo_path: &Path, passphrase: &str, network: NetworkMode) -> Result<Self> {
        Self::open_path(&datastore_path(repo_path, network), passphrase)
    }

    /// Open a datastore file directly
    pub fn open_path(path: &Path, passphrase: &str) -> Result<Self> {
        let conn_err = |source| MigrationError::Connection {
            path: path.to_path_buf(),
            source,
        };

        let conn = Connection::open(path).map_err(conn_err)?;
        let db = DatabaseConn {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.unlock(passphrase).map_err(conn_err)?;
        debug!("Opened datastore at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory datastore
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| MigrationError::Connection {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Ok(DatabaseConn { conn, path: None })
    }

    /// Path of the underlying file, `None` for in-memory datastores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply the passphrase and make sure the datastore is readable
    fn unlock(&self, passphrase: &str) -> rusqlite::Result<()> {
        if !passphrase.is_empty() {
            self.conn.pragma_update(None, "key", passphrase)?;
        }

        // With SQLCipher a wrong key only shows up on first read
        let _: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
        Ok(())
    }

    /// Run statements in order inside one transaction
    ///
    /// Stops at the first failing statement and returns its error; the
    /// transaction is rolled back and later statements never run.
    pub fn execute_in_transaction<S: AsRef<str>>(&self, statements: &[S]) -> rusqlite::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for stmt in statements {
            debug!("Executing: {}", stmt.as_ref());
            tx.execute(stmt.as_ref(), [])?;
        }
        tx.commit()
    }

    /// Run one prepared statement per parameter row inside one transaction
    ///
    /// Returns the total number of affected rows. Any failure rolls back
    /// every row written so far.
    pub fn execute_batch_in_transaction<P, I>(&self, sql: &str, rows: I) -> rusqlite::Result<usize>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for params in rows {
                affected += stmt.execute(params)?;
            }
        } // stmt is dropped here

        tx.commit()?;
        Ok(affected)
    }

    /// Check if a table exists in the datastore
    pub fn table_exists(&self, table_name: &str) -> rusqlite::Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> rusqlite::Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", table_name);
        self.conn.query_row(&query, [], |row| row.get(0))
    }
}
