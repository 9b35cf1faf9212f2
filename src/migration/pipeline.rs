//! Stage ordering for applying a migration step
//!
//! Upgrades run as three committed stages: schema, ledger, backfill. They
//! are deliberately not one transaction. The state reached is kept on the
//! pipeline so callers can tell which consistency state a failure left the
//! repository in:
//!
//! | state reached     | repository after a failure in the next stage              |
//! |-------------------|-----------------------------------------------------------|
//! | `NotStarted`      | untouched                                                 |
//! | `SchemaCommitted` | new schema, old ledger version; needs manual recovery     |
//! | `LedgerAdvanced`  | new version, derived columns partially filled; re-runnable|
//! | `Backfilled`      | done                                                      |

use crate::error::{MigrationError, Result};
use crate::migration::{BackfillSummary, Migration, MigrationContext};
use tracing::{info, warn};

/// Last stage a pipeline committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    NotStarted,
    SchemaCommitted,
    LedgerAdvanced,
    Backfilled,
}

/// Forward application of one step
pub struct UpgradePipeline<'a> {
    migration: &'a dyn Migration,
    ctx: &'a MigrationContext,
    state: PipelineState,
    summaries: Vec<BackfillSummary>,
}

impl<'a> UpgradePipeline<'a> {
    pub fn new(migration: &'a dyn Migration, ctx: &'a MigrationContext) -> Self {
        Self {
            migration,
            ctx,
            state: PipelineState::NotStarted,
            summaries: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Per-table backfill results, empty until the backfill stage succeeds
    pub fn summaries(&self) -> &[BackfillSummary] {
        &self.summaries
    }

    /// Apply schema, then advance the ledger, then backfill
    ///
    /// Returns the first error hit. Stages committed before it stay
    /// committed.
    pub fn run(&mut self) -> Result<()> {
        let version = self.migration.target_version();
        info!(
            "Applying migration '{}' (v{} -> v{})",
            self.migration.name(),
            self.migration.base_version(),
            version
        );

        let db = self.ctx.open_store()?;

        db.execute_in_transaction(&self.migration.up_statements())
            .map_err(|source| MigrationError::Schema { version, source })?;
        self.state = PipelineState::SchemaCommitted;
        info!("Schema for v{} committed", version);

        self.ctx.ledger().write(version)?;
        self.state = PipelineState::LedgerAdvanced;
        info!("Repository version advanced to {}", version);

        match self.migration.backfill(&db) {
            Ok(summaries) => self.summaries = summaries,
            Err(e) => {
                warn!(
                    "Backfill for v{} failed, schema and version stay committed: {}",
                    version, e
                );
                return Err(e);
            }
        }
        self.state = PipelineState::Backfilled;
        info!("Migration '{}' complete", self.migration.name());

        Ok(())
    }
}

/// Backward application of one step
pub struct DowngradePipeline<'a> {
    migration: &'a dyn Migration,
    ctx: &'a MigrationContext,
    state: PipelineState,
}

impl<'a> DowngradePipeline<'a> {
    pub fn new(migration: &'a dyn Migration, ctx: &'a MigrationContext) -> Self {
        Self {
            migration,
            ctx,
            state: PipelineState::NotStarted,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Rebuild the previous schema, then move the ledger back
    pub fn run(&mut self) -> Result<()> {
        let version = self.migration.base_version();
        info!(
            "Reverting migration '{}' (v{} -> v{})",
            self.migration.name(),
            self.migration.target_version(),
            version
        );

        let db = self.ctx.open_store()?;

        db.execute_in_transaction(&self.migration.down_statements())
            .map_err(|source| MigrationError::Schema { version, source })?;
        self.state = PipelineState::SchemaCommitted;
        info!("Schema for v{} restored", version);

        self.ctx.ledger().write(version)?;
        self.state = PipelineState::LedgerAdvanced;
        info!("Repository version moved back to {}", version);

        Ok(())
    }
}

/// Apply a step forward
pub fn up(migration: &dyn Migration, ctx: &MigrationContext) -> Result<()> {
    UpgradePipeline::new(migration, ctx).run()
}

/// Apply a step backward
pub fn down(migration: &dyn Migration, ctx: &MigrationContext) -> Result<()> {
    DowngradePipeline::new(migration, ctx).run()
}
