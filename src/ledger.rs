//! Repository version ledger
//!
//! The repository version is a single integer stored as the entire content
//! of `{repo}/repover`. It is the only record of which migration runs
//! next; the datastore schema carries no version marker.

use crate::error::LedgerError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// File name of the version record under the repository root
pub const REPOVER_FILE: &str = "repover";

/// Read/write access to the current repository version
pub trait VersionLedger {
    fn read(&self) -> Result<u32, LedgerError>;

    fn write(&self, version: u32) -> Result<(), LedgerError>;
}

/// Ledger backed by the `repover` file
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger at `{repo}/repover`
    pub fn for_repo(repo_path: &Path) -> Self {
        Self::new(repo_path.join(REPOVER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionLedger for FileLedger {
    fn read(&self) -> Result<u32, LedgerError> {
        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LedgerError::NotFound {
                path: self.path.clone(),
            },
            _ => LedgerError::Unreadable {
                path: self.path.clone(),
                source: e,
            },
        })?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|_| LedgerError::Malformed {
                path: self.path.clone(),
                content,
            })
    }

    /// Replace the record via a synced temp file renamed over the old one
    fn write(&self, version: u32) -> Result<(), LedgerError> {
        let unwritable = |source| LedgerError::Unwritable {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(unwritable)?;
        tmp.write_all(version.to_string().as_bytes())
            .map_err(unwritable)?;
        tmp.as_file().sync_all().map_err(unwritable)?;
        tmp.persist(&self.path).map_err(|e| unwritable(e.error))?;

        debug!("Wrote repository version {} to {}", version, self.path.display());
        Ok(())
    }
}

/// In-memory ledger that can be told to fail, for exercising the states
/// between pipeline stages
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryLedger {
    version: std::cell::Cell<Option<u32>>,
    fail_writes: std::cell::Cell<bool>,
}

#[cfg(test)]
impl MemoryLedger {
    pub(crate) fn at(version: u32) -> Self {
        let ledger = Self::default();
        ledger.version.set(Some(version));
        ledger
    }

    pub(crate) fn failing_writes(self) -> Self {
        self.fail_writes.set(true);
        self
    }
}

#[cfg(test)]
impl VersionLedger for MemoryLedger {
    fn read(&self) -> Result<u32, LedgerError> {
        self.version.get().ok_or_else(|| LedgerError::NotFound {
            path: PathBuf::from("<memory>"),
        })
    }

    fn write(&self, version: u32) -> Result<(), LedgerError> {
        if self.fail_writes.get() {
            return Err(LedgerError::Unwritable {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(ErrorKind::PermissionDenied, "read-only ledger"),
            });
        }
        self.version.set(Some(version));
        Ok(())
    }
}
