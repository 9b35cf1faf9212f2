//! Datastore schema introspection
//!
//! The datastore carries no version marker of its own; the repository
//! version lives in the ledger file. This module reads the live shape of
//! tables so migrations can probe whether their changes are present and
//! tests can compare shapes before and after a round trip.

use crate::database::core::DatabaseConn;
use serde::Serialize;
use std::collections::BTreeSet;

/// Column and index names of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    /// Column names in declaration order
    pub columns: Vec<String>,
    /// Names of explicitly created indexes (auto-indexes excluded)
    pub indexes: BTreeSet<String>,
}

impl TableSchema {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

impl DatabaseConn {
    /// Read the current shape of a table
    ///
    /// Returns `None` when the table doesn't exist.
    pub fn table_schema(&self, table: &str) -> rusqlite::Result<Option<TableSchema>> {
        if !self.table_exists(table)? {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='index' AND tbl_name=?1 AND sql IS NOT NULL",
        )?;
        let indexes = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        Ok(Some(TableSchema {
            table: table.to_string(),
            columns,
            indexes,
        }))
    }

    /// Check whether a column exists on a table
    pub fn column_exists(&self, table: &str, column: &str) -> rusqlite::Result<bool> {
        Ok(self
            .table_schema(table)?
            .map(|schema| schema.has_column(column))
            .unwrap_or(false))
    }
}

/// Status of a repository relative to the migrations this build knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// Ledger is at the latest supported version
    Current { version: u32 },

    /// Ledger is behind; steps from `from` to `to` are pending
    NeedsMigration { from: u32, to: u32 },

    /// Repository is from a newer build
    Incompatible {
        ledger_version: u32,
        supported_version: u32,
    },

    /// The next step's schema is already present but the ledger was never
    /// advanced, i.e. a crash between the schema commit and the ledger write
    Inconsistent { ledger_version: u32 },
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaStatus::Current { version } => write!(f, "current (v{})", version),
            SchemaStatus::NeedsMigration { from, to } => {
                write!(f, "needs migration (v{} -> v{})", from, to)
            }
            SchemaStatus::Incompatible {
                ledger_version,
                supported_version,
            } => write!(
                f,
                "incompatible (repository v{}, supported up to v{})",
                ledger_version, supported_version
            ),
            SchemaStatus::Inconsistent { ledger_version } => write!(
                f,
                "inconsistent (schema ahead of repository v{})",
                ledger_version
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> DatabaseConn {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TABLE sales (orderID TEXT PRIMARY KEY NOT NULL, contract BLOB, paymentAddr TEXT, timestamp INTEGER);
                 CREATE INDEX index_sales ON sales (paymentAddr, timestamp);",
            )
            .unwrap();
        db
    }

    #[test]
    fn test_table_schema() {
        let db = create_test_db();
        let schema = db.table_schema("sales").unwrap().unwrap();

        assert_eq!(
            schema.columns,
            vec!["orderID", "contract", "paymentAddr", "timestamp"]
        );
        // the primary key's autoindex has no sql and is left out
        assert_eq!(
            schema.indexes.iter().collect::<Vec<_>>(),
            vec!["index_sales"]
        );
    }

    #[test]
    fn test_table_schema_missing() {
        let db = create_test_db();
        assert!(db.table_schema("purchases").unwrap().is_none());
    }

    #[test]
    fn test_column_exists() {
        let db = create_test_db();
        assert!(db.column_exists("sales", "contract").unwrap());
        assert!(db.column_exists("sales", "CONTRACT").unwrap());
        assert!(!db.column_exists("sales", "coinType").unwrap());
        assert!(!db.column_exists("purchases", "contract").unwrap());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            SchemaStatus::NeedsMigration { from: 9, to: 10 }.to_string(),
            "needs migration (v9 -> v10)"
        );
        assert_eq!(
            SchemaStatus::Current { version: 10 }.to_string(),
            "current (v10)"
        );
    }
}
