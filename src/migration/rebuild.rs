//! Table rebuild for dropping columns
//!
//! SQLite can't reliably drop columns that older datastores may carry, so
//! a downgrade recreates the table in its previous shape and copies over
//! only the columns that shape knows about.

/// Recreate `table` from `create_sql`, keeping only `columns`
#[derive(Debug, Clone)]
pub struct TableRebuild {
    pub table: &'static str,
    pub create_sql: &'static str,
    pub index_sql: &'static [&'static str],
    pub columns: &'static [&'static str],
}

impl TableRebuild {
    /// Name the old table is parked under while copying
    pub fn temp_table(&self) -> String {
        format!("temp_{}", self.table)
    }

    /// Rename, create, copy, drop, then index
    ///
    /// Indexes come last: index names are global in SQLite and the parked
    /// table still owns the old ones until it is dropped.
    pub fn statements(&self) -> Vec<String> {
        let temp = self.temp_table();
        let columns = self.columns.join(", ");

        let mut stmts = vec![
            format!("ALTER TABLE {} RENAME TO {};", self.table, temp),
            self.create_sql.to_string(),
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {};",
                self.table, columns, columns, temp
            ),
            format!("DROP TABLE {};", temp),
        ];
        stmts.extend(self.index_sql.iter().map(|s| s.to_string()));
        stmts
    }
}
