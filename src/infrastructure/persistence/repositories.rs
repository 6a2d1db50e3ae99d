//! SQLite implementations of the ledger and snapshot repositories.
//!
//! Decimals are stored as TEXT, ids as hyphenated UUID TEXT and timestamps
//! as INTEGER milliseconds since the epoch.

mod ledger_repository;
mod snapshot_repository;
mod unit_of_work;

pub use ledger_repository::SqliteLedgerRepository;
pub use snapshot_repository::SqliteSnapshotRepository;
pub use unit_of_work::SqliteUnitOfWork;

use crate::domain::ledger::{Lot, Transaction, TransactionKind};
use crate::domain::valuation::PortfolioSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::str::FromStr;
use uuid::Uuid;

const LOT_COLUMNS: &str =
    "id, student_id, class_id, symbol, quantity, purchase_price, purchased_at";

const TRANSACTION_COLUMNS: &str = "id, student_id, class_id, symbol, kind, amount, price, \
     balance_after, net_profit, created_at";

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).with_context(|| format!("Invalid decimal in {}: {}", column, raw))
}

fn optional_decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| {
        Decimal::from_str(&value)
            .with_context(|| format!("Invalid decimal in {}: {}", column, value))
    })
    .transpose()
}

fn uuid_column(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).with_context(|| format!("Invalid uuid in {}: {}", column, raw))
}

fn timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let millis: i64 = row.try_get(column)?;
    DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("Timestamp out of range in {}: {}", column, millis))
}

fn map_lot(row: &SqliteRow) -> Result<Lot> {
    Ok(Lot {
        id: uuid_column(row, "id")?,
        student_id: uuid_column(row, "student_id")?,
        class_id: uuid_column(row, "class_id")?,
        symbol: row.try_get("symbol")?,
        quantity: decimal_column(row, "quantity")?,
        purchase_price: decimal_column(row, "purchase_price")?,
        purchased_at: timestamp_column(row, "purchased_at")?,
    })
}

fn map_transaction(row: &SqliteRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    Ok(Transaction {
        id: uuid_column(row, "id")?,
        student_id: uuid_column(row, "student_id")?,
        class_id: uuid_column(row, "class_id")?,
        symbol: row.try_get("symbol")?,
        kind: TransactionKind::from_str(&kind)?,
        amount: decimal_column(row, "amount")?,
        price: decimal_column(row, "price")?,
        balance_after: decimal_column(row, "balance_after")?,
        net_profit: optional_decimal_column(row, "net_profit")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn map_snapshot(row: &SqliteRow) -> Result<PortfolioSnapshot> {
    Ok(PortfolioSnapshot {
        id: uuid_column(row, "id")?,
        student_id: uuid_column(row, "student_id")?,
        class_id: uuid_column(row, "class_id")?,
        valuation: decimal_column(row, "valuation")?,
        calculated_at: timestamp_column(row, "calculated_at")?,
    })
}
