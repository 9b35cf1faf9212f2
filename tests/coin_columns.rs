//! End-to-end tests for the version 10 coin columns migration against a
//! file-backed repository.

use datastore_migrate::migration::{down, up};
use datastore_migrate::{
    CoinColumns, DatabaseConn, FileLedger, MigrationContext, MigrationError, NetworkMode,
    TableSchema, VersionLedger,
};
use std::fs;
use tempfile::TempDir;

const PASSWORD: &str = "letmein";

const TABLES: [&str; 3] = ["cases", "sales", "purchases"];

const CREATE_V9: [&str; 4] = [
    "create table cases (caseID text primary key not null, buyerContract blob, vendorContract blob, buyerValidationErrors blob, vendorValidationErrors blob, buyerPayoutAddress text, vendorPayoutAddress text, buyerOutpoints blob, vendorOutpoints blob, state integer, read integer, timestamp integer, buyerOpened integer, claim text, disputeResolution blob, lastDisputeExpiryNotifiedAt integer not null default 0);",
    "create table sales (orderID text primary key not null, contract blob, state integer, read integer, timestamp integer, total integer, thumbnail text, buyerID text, buyerHandle text, title text, shippingName text, shippingAddress text, paymentAddr text, funded integer, transactions blob, needsSync integer, lastDisputeTimeoutNotifiedAt integer not null default 0);",
    "create index index_sales on sales (paymentAddr, timestamp);",
    "create table purchases (orderID text primary key not null, contract blob, state integer, read integer, timestamp integer, total integer, thumbnail text, vendorID text, vendorHandle text, title text, shippingName text, shippingAddress text, paymentAddr text, funded integer, transactions blob, lastDisputeTimeoutNotifiedAt integer not null default 0, lastDisputeExpiryNotifiedAt integer not null default 0, disputedAt integer not null default 0);",
];

/// A disputed crypto-listing contract: listing coin TETH, accepted TBTC,
/// no coin declared on the order payment
fn disputed_crypto_contract() -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "vendorListings": [{
            "slug": "teth-for-sale",
            "vendorID": {"peerID": "QmVendor", "handle": "@vendor"},
            "metadata": {
                "version": 5,
                "contractType": "CRYPTOCURRENCY",
                "format": "MARKET_PRICE",
                "expiry": "2037-12-31T00:00:00Z",
                "acceptedCurrencies": ["TBTC"],
                "pricingCurrency": "",
                "coinType": "TETH",
                "coinDivisibility": 100000000
            },
            "item": {"title": "Ethereum", "tags": [], "images": []}
        }],
        "buyerOrder": {
            "refundAddress": "mkW3...",
            "items": [{"listingHash": "QmListing", "quantity": 0}],
            "payment": {
                "method": "MODERATED",
                "moderator": "QmModerator",
                "amount": "10000",
                "chaincode": "",
                "address": "2N5...",
                "redeemScript": "",
                "coin": ""
            }
        },
        "dispute": {"claim": "item not received"},
        "signatures": []
    }))
    .unwrap()
}

fn setup_repo() -> (TempDir, MigrationContext) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("datastore")).unwrap();

    let db = DatabaseConn::open_repo(dir.path(), PASSWORD, NetworkMode::Testnet).unwrap();
    db.execute_in_transaction(&CREATE_V9).unwrap();
    FileLedger::for_repo(dir.path()).write(9).unwrap();

    let ctx = MigrationContext::new(dir.path(), PASSWORD, NetworkMode::Testnet);
    (dir, ctx)
}

fn seed_all_tables(db: &DatabaseConn, contract: &str) {
    for stmt in [
        "INSERT INTO cases(caseID, buyerContract) VALUES('1', ?);",
        "INSERT INTO sales(orderID, contract) VALUES('1', ?);",
        "INSERT INTO purchases(orderID, contract) VALUES('1', ?);",
    ] {
        db.conn.execute(stmt, [contract]).unwrap();
    }
}

fn assert_repover(dir: &TempDir, expected: &str) {
    let content = fs::read_to_string(dir.path().join("repover")).unwrap();
    assert_eq!(content, expected, "unexpected repover content");
}

fn coins(db: &DatabaseConn, table: &str) -> (String, String) {
    db.conn
        .query_row(
            &format!("SELECT coinType, paymentCoin FROM {} LIMIT 1;", table),
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap()
}

fn schemas(db: &DatabaseConn) -> Vec<TableSchema> {
    TABLES
        .iter()
        .map(|t| db.table_schema(t).unwrap().unwrap())
        .collect()
}

#[test]
fn test_coin_columns_up_and_down() {
    let (dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    seed_all_tables(&db, &disputed_crypto_contract());

    up(&CoinColumns, &ctx).unwrap();
    assert_repover(&dir, "10");

    for table in TABLES {
        let (coin_type, payment_coin) = coins(&db, table);
        assert_eq!(coin_type, "TETH", "incorrect coinType for table {}", table);
        assert_eq!(payment_coin, "TBTC", "incorrect paymentCoin for table {}", table);
    }

    down(&CoinColumns, &ctx).unwrap();
    assert_repover(&dir, "9");

    for table in TABLES {
        for column in ["coinType", "paymentCoin"] {
            let err = db
                .conn
                .prepare(&format!("SELECT {} FROM {};", column, table))
                .unwrap_err();
            assert!(
                err.to_string().contains(&format!("no such column: {}", column)),
                "unexpected error: {}",
                err
            );
        }
    }
}

#[test]
fn test_round_trip_restores_schema_and_rows() {
    let (_dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    let contract = disputed_crypto_contract();
    seed_all_tables(&db, &contract);
    db.conn
        .execute(
            "UPDATE sales SET paymentAddr = 'addr', timestamp = 1700000000, total = 12, needsSync = 1 WHERE orderID = '1'",
            [],
        )
        .unwrap();

    let schema_before = schemas(&db);
    let row_before: (String, String, i64, i64) = db
        .conn
        .query_row(
            "SELECT contract, paymentAddr, timestamp, total FROM sales WHERE orderID = '1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();

    up(&CoinColumns, &ctx).unwrap();
    down(&CoinColumns, &ctx).unwrap();

    assert_eq!(schemas(&db), schema_before);
    assert!(schema_before[1].indexes.contains("index_sales"));

    let row_after: (String, String, i64, i64) = db
        .conn
        .query_row(
            "SELECT contract, paymentAddr, timestamp, total FROM sales WHERE orderID = '1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(row_after, row_before);
    assert_eq!(row_after.0, contract);
}

#[test]
fn test_empty_document_keeps_defaults() {
    let (dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    seed_all_tables(&db, "");

    up(&CoinColumns, &ctx).unwrap();
    assert_repover(&dir, "10");

    for table in TABLES {
        assert_eq!(coins(&db, table), (String::new(), String::new()));
    }
}

#[test]
fn test_vendor_contract_used_when_buyer_copy_missing() {
    let (_dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    db.conn
        .execute(
            "INSERT INTO cases(caseID, vendorContract) VALUES('2', ?);",
            [disputed_crypto_contract()],
        )
        .unwrap();

    up(&CoinColumns, &ctx).unwrap();
    assert_eq!(coins(&db, "cases"), ("TETH".to_string(), "TBTC".to_string()));
}

#[test]
fn test_malformed_document_fails_after_version_bump() {
    let (dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    seed_all_tables(&db, &disputed_crypto_contract());
    db.conn
        .execute(
            "INSERT INTO cases(caseID, buyerContract) VALUES('2', '{\"vendorListings\": 3}');",
            [],
        )
        .unwrap();

    let err = up(&CoinColumns, &ctx).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Decode { ref table, ref id, .. } if table == "cases" && id == "2"
    ));

    // schema and version stay committed, tables after the failing one are untouched
    assert_repover(&dir, "10");
    for table in TABLES {
        assert_eq!(coins(&db, table), (String::new(), String::new()), "table {}", table);
    }
}

#[test]
fn test_schema_failure_leaves_version_alone() {
    let (dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    db.conn.execute("DROP TABLE purchases;", []).unwrap();

    let err = up(&CoinColumns, &ctx).unwrap_err();
    assert!(matches!(err, MigrationError::Schema { version: 10, .. }));
    assert_repover(&dir, "9");

    // the ALTERs on cases and sales were rolled back too
    assert!(!db.column_exists("cases", "coinType").unwrap());
    assert!(!db.column_exists("sales", "paymentCoin").unwrap());
}

struct ReadOnlyLedger(FileLedger);

impl VersionLedger for ReadOnlyLedger {
    fn read(&self) -> Result<u32, datastore_migrate::LedgerError> {
        self.0.read()
    }

    fn write(&self, _version: u32) -> Result<(), datastore_migrate::LedgerError> {
        Err(datastore_migrate::LedgerError::Unwritable {
            path: self.0.path().to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[test]
fn test_ledger_failure_skips_backfill() {
    let (dir, ctx) = setup_repo();
    let db = ctx.open_store().unwrap();
    seed_all_tables(&db, &disputed_crypto_contract());

    let ctx = ctx.with_ledger(Box::new(ReadOnlyLedger(FileLedger::for_repo(dir.path()))));
    let err = up(&CoinColumns, &ctx).unwrap_err();
    assert!(matches!(err, MigrationError::Ledger(_)));

    assert_repover(&dir, "9");
    assert!(db.column_exists("sales", "coinType").unwrap());
    assert_eq!(coins(&db, "sales"), (String::new(), String::new()));
}

#[test]
fn test_mainnet_and_testnet_are_separate() {
    let (dir, _ctx) = setup_repo();
    let ctx = MigrationContext::new(dir.path(), PASSWORD, NetworkMode::Mainnet);

    // the mainnet datastore was never created with the v9 tables
    let err = up(&CoinColumns, &ctx).unwrap_err();
    assert!(matches!(err, MigrationError::Schema { .. }));
    assert_repover(&dir, "9");
}
