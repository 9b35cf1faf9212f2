//! Coin column backfill
//!
//! Derives `coinType` and `paymentCoin` for every row of a table from the
//! contract document stored alongside it. The pass reads every row first
//! and only then writes, in a single transaction, so no cursor is held
//! open across writes.

use crate::database::DatabaseConn;
use crate::document::Contract;
use crate::error::{DocumentError, MigrationError, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

pub const COIN_TYPE_COLUMN: &str = "coinType";
pub const PAYMENT_COIN_COLUMN: &str = "paymentCoin";

/// Where to find ids and documents for one table
#[derive(Debug, Clone)]
pub struct BackfillTarget {
    pub table: &'static str,
    pub id_column: &'static str,
    /// Column or SQL expression yielding the document, e.g.
    /// `COALESCE(buyerContract, vendorContract)`
    pub document_expr: &'static str,
}

/// Primary key of a backfilled row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Integer(i64),
    Text(String),
}

impl RowKey {
    fn from_value(value: ValueRef<'_>, column: &str) -> rusqlite::Result<Self> {
        match value {
            ValueRef::Integer(i) => Ok(RowKey::Integer(i)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| RowKey::Text(s.to_string()))
                .map_err(rusqlite::Error::Utf8Error),
            other => Err(rusqlite::Error::InvalidColumnType(
                0,
                column.to_string(),
                other.data_type(),
            )),
        }
    }
}

impl ToSql for RowKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            RowKey::Integer(i) => i.to_sql(),
            RowKey::Text(s) => s.to_sql(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Integer(i) => write!(f, "{}", i),
            RowKey::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Derived coin values for one row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coinset {
    pub coin_type: String,
    pub payment_coin: String,
}

/// Outcome of one table's backfill
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub table: String,
    pub scanned: usize,
    pub skipped: usize,
    pub updated: usize,
}

/// Compute the coin values for a decoded contract
///
/// The payment coin is the order's declared coin, falling back to the
/// first accepted currency of the first listing. The coin type comes from
/// the first listing. Missing values become empty strings.
pub fn derive_coinset(contract: &Contract) -> Coinset {
    let listing = contract.first_listing();

    let payment_coin = contract
        .declared_payment_coin()
        .or_else(|| {
            listing
                .and_then(|l| l.accepted_currencies().first())
                .map(String::as_str)
        })
        .unwrap_or_default()
        .to_string();

    let coin_type = listing
        .and_then(|l| l.coin_type())
        .unwrap_or_default()
        .to_string();

    Coinset {
        coin_type,
        payment_coin,
    }
}

/// Fill the coin columns of `target.table` from its stored documents
///
/// Rows with an empty or NULL document are left alone. A document that
/// fails to decode aborts the whole table before anything is written.
pub fn backfill(db: &DatabaseConn, target: &BackfillTarget) -> Result<BackfillSummary> {
    let (coins, scanned, skipped) = collect_coinsets(db, target)?;

    let sql = format!(
        "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3",
        target.table, COIN_TYPE_COLUMN, PAYMENT_COIN_COLUMN, target.id_column
    );
    let updated = db
        .execute_batch_in_transaction(
            &sql,
            coins
                .iter()
                .map(|(id, c)| (c.coin_type.as_str(), c.payment_coin.as_str(), id)),
        )
        .map_err(|source| MigrationError::BackfillWrite {
            table: target.table.to_string(),
            source,
        })?;

    info!(
        "Backfilled {} rows in '{}' ({} scanned, {} without a document)",
        updated, target.table, scanned, skipped
    );

    Ok(BackfillSummary {
        table: target.table.to_string(),
        scanned,
        skipped,
        updated,
    })
}

/// Read phase: decode every row's document and derive its coinset
///
/// A later row with the same id replaces an earlier one.
fn collect_coinsets(
    db: &DatabaseConn,
    target: &BackfillTarget,
) -> Result<(BTreeMap<RowKey, Coinset>, usize, usize)> {
    let read_err = |source| MigrationError::BackfillRead {
        table: target.table.to_string(),
        source,
    };

    let sql = format!(
        "SELECT {}, {} FROM {};",
        target.id_column, target.document_expr, target.table
    );
    let mut stmt = db.conn.prepare(&sql).map_err(read_err)?;
    let mut rows = stmt.query([]).map_err(read_err)?;

    let mut coins = BTreeMap::new();
    let mut scanned = 0;
    let mut skipped = 0;

    while let Some(row) = rows.next().map_err(read_err)? {
        scanned += 1;
        let id = RowKey::from_value(row.get_ref(0).map_err(read_err)?, target.id_column)
            .map_err(read_err)?;

        let bytes = match row.get_ref(1).map_err(read_err)? {
            ValueRef::Null => &[][..],
            ValueRef::Text(b) | ValueRef::Blob(b) => b,
            other => {
                return Err(MigrationError::Decode {
                    table: target.table.to_string(),
                    id: id.to_string(),
                    source: DocumentError::NotText(other.data_type()),
                })
            }
        };

        if bytes.is_empty() {
            debug!("Skipping row '{}' in '{}': no document", id, target.table);
            skipped += 1;
            continue;
        }

        let contract = Contract::from_bytes(bytes).map_err(|source| MigrationError::Decode {
            table: target.table.to_string(),
            id: id.to_string(),
            source,
        })?;

        let coinset = derive_coinset(&contract);
        debug!(
            "Row '{}' in '{}': coinType='{}' paymentCoin='{}'",
            id, target.table, coinset.coin_type, coinset.payment_coin
        );
        coins.insert(id, coinset);
    }

    Ok((coins, scanned, skipped))
}
