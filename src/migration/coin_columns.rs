//! Version 10: coin columns on orders and cases
//!
//! Adds `coinType` and `paymentCoin` to `cases`, `sales` and `purchases`,
//! then fills them from each row's stored contract. Reverting rebuilds the
//! three tables in their version 9 shape, dropping both columns.

use crate::database::DatabaseConn;
use crate::error::{MigrationError, Result};
use crate::migration::backfill::{
    backfill, BackfillSummary, BackfillTarget, COIN_TYPE_COLUMN, PAYMENT_COIN_COLUMN,
};
use crate::migration::rebuild::TableRebuild;
use crate::migration::Migration;

/// `cases` as of version 9
pub const CREATE_CASES_V9: &str = "create table cases (caseID text primary key not null, buyerContract blob, vendorContract blob, buyerValidationErrors blob, vendorValidationErrors blob, buyerPayoutAddress text, vendorPayoutAddress text, buyerOutpoints blob, vendorOutpoints blob, state integer, read integer, timestamp integer, buyerOpened integer, claim text, disputeResolution blob, lastDisputeExpiryNotifiedAt integer not null default 0);";

/// `sales` as of version 9
pub const CREATE_SALES_V9: &str = "create table sales (orderID text primary key not null, contract blob, state integer, read integer, timestamp integer, total integer, thumbnail text, buyerID text, buyerHandle text, title text, shippingName text, shippingAddress text, paymentAddr text, funded integer, transactions blob, needsSync integer, lastDisputeTimeoutNotifiedAt integer not null default 0);";

pub const CREATE_SALES_INDEX_V9: &str =
    "create index index_sales on sales (paymentAddr, timestamp);";

/// `purchases` as of version 9
pub const CREATE_PURCHASES_V9: &str = "create table purchases (orderID text primary key not null, contract blob, state integer, read integer, timestamp integer, total integer, thumbnail text, vendorID text, vendorHandle text, title text, shippingName text, shippingAddress text, paymentAddr text, funded integer, transactions blob, lastDisputeTimeoutNotifiedAt integer not null default 0, lastDisputeExpiryNotifiedAt integer not null default 0, disputedAt integer not null default 0);";

const TABLES: [&str; 3] = ["cases", "sales", "purchases"];

const REBUILDS: [TableRebuild; 3] = [
    TableRebuild {
        table: "cases",
        create_sql: CREATE_CASES_V9,
        index_sql: &[],
        columns: &[
            "caseID",
            "buyerContract",
            "vendorContract",
            "buyerValidationErrors",
            "vendorValidationErrors",
            "buyerPayoutAddress",
            "vendorPayoutAddress",
            "buyerOutpoints",
            "vendorOutpoints",
            "state",
            "read",
            "timestamp",
            "buyerOpened",
            "claim",
            "disputeResolution",
            "lastDisputeExpiryNotifiedAt",
        ],
    },
    TableRebuild {
        table: "sales",
        create_sql: CREATE_SALES_V9,
        index_sql: &[CREATE_SALES_INDEX_V9],
        columns: &[
            "orderID",
            "contract",
            "state",
            "read",
            "timestamp",
            "total",
            "thumbnail",
            "buyerID",
            "buyerHandle",
            "title",
            "shippingName",
            "shippingAddress",
            "paymentAddr",
            "funded",
            "transactions",
            "needsSync",
            "lastDisputeTimeoutNotifiedAt",
        ],
    },
    TableRebuild {
        table: "purchases",
        create_sql: CREATE_PURCHASES_V9,
        index_sql: &[],
        columns: &[
            "orderID",
            "contract",
            "state",
            "read",
            "timestamp",
            "total",
            "thumbnail",
            "vendorID",
            "vendorHandle",
            "title",
            "shippingName",
            "shippingAddress",
            "paymentAddr",
            "funded",
            "transactions",
            "lastDisputeTimeoutNotifiedAt",
            "lastDisputeExpiryNotifiedAt",
            "disputedAt",
        ],
    },
];

/// Cases prefer the buyer's copy of the contract over the vendor's
const BACKFILL_TARGETS: [BackfillTarget; 3] = [
    BackfillTarget {
        table: "cases",
        id_column: "caseID",
        document_expr: "COALESCE(buyerContract, vendorContract) AS contract",
    },
    BackfillTarget {
        table: "sales",
        id_column: "orderID",
        document_expr: "contract",
    },
    BackfillTarget {
        table: "purchases",
        id_column: "orderID",
        document_expr: "contract",
    },
];

/// Migration from version 9 to 10
#[derive(Debug, Clone, Copy, Default)]
pub struct CoinColumns;

impl Migration for CoinColumns {
    fn target_version(&self) -> u32 {
        10
    }

    fn name(&self) -> &'static str {
        "coin_columns"
    }

    fn up_statements(&self) -> Vec<String> {
        [COIN_TYPE_COLUMN, PAYMENT_COIN_COLUMN]
            .iter()
            .flat_map(|column| {
                TABLES.iter().map(move |table| {
                    format!("ALTER TABLE {} ADD COLUMN {} text DEFAULT '';", table, column)
                })
            })
            .collect()
    }

    fn down_statements(&self) -> Vec<String> {
        REBUILDS.iter().flat_map(TableRebuild::statements).collect()
    }

    /// Tables are backfilled in order; the first failing table stops the
    /// pass and later tables keep their defaults
    fn backfill(&self, db: &DatabaseConn) -> Result<Vec<BackfillSummary>> {
        BACKFILL_TARGETS
            .iter()
            .map(|target| backfill(db, target))
            .collect()
    }

    fn is_applied(&self, db: &DatabaseConn) -> Result<bool> {
        let probe = || -> rusqlite::Result<bool> {
            for table in TABLES {
                if db.column_exists(table, COIN_TYPE_COLUMN)?
                    || db.column_exists(table, PAYMENT_COIN_COLUMN)?
                {
                    return Ok(true);
                }
            }
            Ok(false)
        };

        probe().map_err(|source| MigrationError::Schema {
            version: self.target_version(),
            source,
        })
    }
}
