//! Versioned, reversible datastore migrations
//!
//! A migration step moves a repository between two consecutive versions.
//! Its forward direction applies DDL in one transaction, advances the
//! version ledger, and then runs an advisory data backfill. Its backward
//! direction rebuilds the affected tables in their previous shape and
//! moves the ledger back.
//!
//! ```text
//! migration/
//! ├── pipeline      # Up/Down stage ordering and reached state
//! ├── rebuild       # rename/create/copy/drop table rebuild
//! ├── backfill      # derive coin columns from stored contracts
//! ├── coin_columns  # version 9 -> 10
//! └── runner        # ledger-driven orchestration over the registry
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use datastore_migrate::migration::{MigrationContext, MigrationRunner};
//! use datastore_migrate::database::NetworkMode;
//!
//! let ctx = MigrationContext::new("/path/to/repo", "passphrase", NetworkMode::Mainnet);
//! let runner = MigrationRunner::default();
//! let version = runner.upgrade(&ctx)?;
//! ```

mod backfill;
mod coin_columns;
mod pipeline;
mod rebuild;
mod runner;

pub use backfill::{backfill, derive_coinset, BackfillSummary, BackfillTarget, Coinset, RowKey};
pub use coin_columns::CoinColumns;
pub use pipeline::{down, up, DowngradePipeline, PipelineState, UpgradePipeline};
pub use rebuild::TableRebuild;
pub use runner::MigrationRunner;

use crate::database::{DatabaseConn, NetworkMode};
use crate::error::Result;
use crate::ledger::{FileLedger, VersionLedger};
use std::path::{Path, PathBuf};

/// One step between two consecutive repository versions
///
/// Implementors only describe the change; ordering, transactions, and the
/// ledger are handled by [`UpgradePipeline`] and [`DowngradePipeline`].
pub trait Migration {
    /// Version the repository is at after `up`
    fn target_version(&self) -> u32;

    /// Version the repository is at after `down`
    fn base_version(&self) -> u32 {
        self.target_version().saturating_sub(1)
    }

    fn name(&self) -> &'static str;

    /// Forward DDL, applied in a single transaction
    fn up_statements(&self) -> Vec<String>;

    /// Backward DDL, applied in a single transaction
    fn down_statements(&self) -> Vec<String>;

    /// Best-effort data pass run after the forward schema and ledger are committed
    ///
    /// Returns one summary per table touched.
    fn backfill(&self, _db: &DatabaseConn) -> Result<Vec<BackfillSummary>> {
        Ok(Vec::new())
    }

    /// Whether the datastore already has this step's forward shape
    fn is_applied(&self, db: &DatabaseConn) -> Result<bool>;
}

/// Everything a step needs to locate and unlock a repository
pub struct MigrationContext {
    pub repo_path: PathBuf,
    pub passphrase: String,
    pub network: NetworkMode,
    ledger: Box<dyn VersionLedger>,
}

impl MigrationContext {
    /// Context using the repository's `repover` file as ledger
    pub fn new(repo_path: impl Into<PathBuf>, passphrase: &str, network: NetworkMode) -> Self {
        let repo_path = repo_path.into();
        let ledger = Box::new(FileLedger::for_repo(&repo_path));
        Self {
            repo_path,
            passphrase: passphrase.to_string(),
            network,
            ledger,
        }
    }

    /// Replace the ledger, e.g. to inject failures in tests
    pub fn with_ledger(mut self, ledger: Box<dyn VersionLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> &dyn VersionLedger {
        self.ledger.as_ref()
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Open the repository datastore for this context
    pub fn open_store(&self) -> Result<DatabaseConn> {
        DatabaseConn::open_repo(&self.repo_path, &self.passphrase, self.network)
    }
}

/// All migrations known to this build, in version order
pub fn registry() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CoinColumns)]
}
