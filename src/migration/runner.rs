//! Ledger-driven migration runner
//!
//! The runner reads the repository version from the ledger and applies the
//! registered steps that lead from it to the requested version, one
//! pipeline at a time.

use crate::database::SchemaStatus;
use crate::error::{MigrationError, Result};
use crate::migration::pipeline::{DowngradePipeline, UpgradePipeline};
use crate::migration::{registry, BackfillSummary, Migration, MigrationContext};
use tracing::info;

/// Applies registered migration steps in version order
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
}

impl Default for MigrationRunner {
    /// Runner over every migration built into this crate
    fn default() -> Self {
        Self {
            migrations: registry(),
        }
    }
}

impl MigrationRunner {
    /// Create a runner over a custom registry
    ///
    /// Steps must be non-empty, sorted, and each must start where the
    /// previous one ended.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self> {
        if migrations.is_empty() {
            return Err(MigrationError::Registry("no migrations".to_string()));
        }

        for m in &migrations {
            if m.base_version() + 1 != m.target_version() {
                return Err(MigrationError::Registry(format!(
                    "'{}' spans v{} -> v{}",
                    m.name(),
                    m.base_version(),
                    m.target_version()
                )));
            }
        }

        for pair in migrations.windows(2) {
            if pair[1].base_version() != pair[0].target_version() {
                return Err(MigrationError::Registry(format!(
                    "'{}' ends at v{} but '{}' starts at v{}",
                    pair[0].name(),
                    pair[0].target_version(),
                    pair[1].name(),
                    pair[1].base_version()
                )));
            }
        }

        Ok(Self { migrations })
    }

    /// Version reached after applying every step
    pub fn latest_version(&self) -> u32 {
        self.migrations
            .last()
            .map(|m| m.target_version())
            .unwrap_or_default()
    }

    /// Oldest version a repository can be upgraded from
    pub fn oldest_version(&self) -> u32 {
        self.migrations
            .first()
            .map(|m| m.base_version())
            .unwrap_or_default()
    }

    fn step_to(&self, version: u32) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.target_version() == version)
            .map(|m| m.as_ref())
    }

    /// Check where the repository stands
    ///
    /// Reports `Inconsistent` when the next step's schema is already in the
    /// datastore although the ledger still names the previous version.
    pub fn status(&self, ctx: &MigrationContext) -> Result<SchemaStatus> {
        let current = ctx.ledger().read()?;
        let latest = self.latest_version();

        if current > latest {
            return Ok(SchemaStatus::Incompatible {
                ledger_version: current,
                supported_version: latest,
            });
        }
        if current == latest {
            return Ok(SchemaStatus::Current { version: current });
        }

        if let Some(next) = self.step_to(current + 1) {
            let db = ctx.open_store()?;
            if next.is_applied(&db)? {
                return Ok(SchemaStatus::Inconsistent {
                    ledger_version: current,
                });
            }
        }

        Ok(SchemaStatus::NeedsMigration {
            from: current,
            to: latest,
        })
    }

    /// Apply every pending step and return the version reached
    pub fn upgrade(&self, ctx: &MigrationContext) -> Result<u32> {
        let (from, to) = match self.status(ctx)? {
            SchemaStatus::Current { version } => {
                info!("Repository is at v{}, nothing to migrate", version);
                return Ok(version);
            }
            SchemaStatus::Incompatible {
                ledger_version,
                supported_version,
            } => {
                return Err(MigrationError::Incompatible {
                    ledger_version,
                    supported_version,
                })
            }
            SchemaStatus::Inconsistent { ledger_version } => {
                return Err(MigrationError::Inconsistent { ledger_version })
            }
            SchemaStatus::NeedsMigration { from, to } => (from, to),
        };

        info!("Migrating repository from v{} to v{}", from, to);
        for version in (from + 1)..=to {
            let step = self.step_to(version).ok_or(MigrationError::MissingStep {
                version: version - 1,
            })?;
            UpgradePipeline::new(step, ctx).run()?;
        }

        Ok(to)
    }

    /// Revert steps until the repository is at `target`
    pub fn downgrade_to(&self, ctx: &MigrationContext, target: u32) -> Result<u32> {
        let current = ctx.ledger().read()?;
        if target >= current {
            info!(
                "Repository is at v{}, nothing to revert for v{}",
                current, target
            );
            return Ok(current);
        }

        info!("Reverting repository from v{} to v{}", current, target);
        for version in ((target + 1)..=current).rev() {
            let step = self
                .step_to(version)
                .ok_or(MigrationError::MissingStep { version })?;
            DowngradePipeline::new(step, ctx).run()?;
        }

        Ok(target)
    }

    /// Re-run the backfill of an applied step
    ///
    /// This is the retry path after a backfill failed past the ledger write.
    pub fn rerun_backfill(
        &self,
        ctx: &MigrationContext,
        version: u32,
    ) -> Result<Vec<BackfillSummary>> {
        let step = self
            .step_to(version)
            .ok_or(MigrationError::MissingStep { version })?;

        let current = ctx.ledger().read()?;
        if current < version {
            return Err(MigrationError::NotApplied {
                version,
                ledger_version: current,
            });
        }

        info!("Re-running backfill for '{}'", step.name());
        let db = ctx.open_store()?;
        step.backfill(&db)
    }
}
