use super::unit_of_work::SqliteUnitOfWork;
use super::{
    LOT_COLUMNS, TRANSACTION_COLUMNS, decimal_column, map_lot, map_transaction, uuid_column,
};
use crate::domain::errors::EnrollmentError;
use crate::domain::ledger::{
    Class, ClassId, ClassLedger, LedgerView, Lot, PositionView, StudentId, StudentStanding,
    Transaction,
};
use crate::domain::repositories::{LedgerRepository, LedgerUnitOfWork};
use crate::domain::valuation::{EnrollmentHoldings, Holding};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub struct SqliteLedgerRepository {
    pool: SqlitePool,
}

impl SqliteLedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for SqliteLedgerRepository {
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;
        Ok(Box::new(SqliteUnitOfWork::new(tx)))
    }

    async fn balance(&self, student_id: StudentId, class_id: ClassId) -> Result<Option<Decimal>> {
        let row = sqlx::query(
            "SELECT balance FROM class_balances WHERE student_id = ? AND class_id = ?",
        )
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load class balance")?;

        row.map(|row| decimal_column(&row, "balance")).transpose()
    }

    async fn lots(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
    ) -> Result<Vec<Lot>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM lots WHERE student_id = ? AND class_id = ? AND symbol = ? \
             ORDER BY purchased_at ASC, seq ASC",
            LOT_COLUMNS
        ))
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load lots")?;

        rows.iter().map(map_lot).collect()
    }

    async fn ledger_view(&self, student_id: StudentId) -> Result<LedgerView> {
        // One read transaction so the three reads agree with each other
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger view read")?;

        let balance_rows = sqlx::query(
            r#"
            SELECT cb.class_id AS class_id, cb.balance AS balance, c.name AS class_name
            FROM class_balances cb
            LEFT JOIN classes c ON c.id = cb.class_id
            WHERE cb.student_id = ?
            ORDER BY cb.class_id
            "#,
        )
        .bind(student_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load class balances")?;

        let lot_rows = sqlx::query(&format!(
            "SELECT {} FROM lots WHERE student_id = ? ORDER BY symbol ASC, purchased_at ASC, seq ASC",
            LOT_COLUMNS
        ))
        .bind(student_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load lots")?;

        let transaction_rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE student_id = ? ORDER BY created_at ASC, rowid ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(student_id.to_string())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to load transactions")?;

        tx.commit().await.context("Failed to finish ledger view read")?;

        let mut lots_by_class: HashMap<ClassId, BTreeMap<String, Vec<Lot>>> = HashMap::new();
        for row in &lot_rows {
            let lot = map_lot(row)?;
            lots_by_class
                .entry(lot.class_id)
                .or_default()
                .entry(lot.symbol.clone())
                .or_default()
                .push(lot);
        }

        let mut transactions_by_class: HashMap<ClassId, Vec<Transaction>> = HashMap::new();
        for row in &transaction_rows {
            let transaction = map_transaction(row)?;
            transactions_by_class
                .entry(transaction.class_id)
                .or_default()
                .push(transaction);
        }

        let mut classes = Vec::with_capacity(balance_rows.len());
        for row in &balance_rows {
            let class_id = uuid_column(row, "class_id")?;
            let positions = lots_by_class
                .remove(&class_id)
                .unwrap_or_default()
                .into_iter()
                .map(|(symbol, lots)| PositionView::from_lots(symbol, lots))
                .collect();

            classes.push(ClassLedger {
                class_id,
                class_name: row.try_get("class_name")?,
                balance: decimal_column(row, "balance")?,
                positions,
                transactions: transactions_by_class.remove(&class_id).unwrap_or_default(),
            });
        }

        Ok(LedgerView {
            student_id,
            classes,
        })
    }

    async fn create_class(&self, name: &str, default_balance: Decimal) -> Result<Class> {
        let class = Class::new(name.trim(), default_balance);
        if class.name.is_empty() {
            anyhow::bail!("Class name must not be empty");
        }
        if class.default_balance < Decimal::ZERO {
            anyhow::bail!("Class default balance must not be negative");
        }

        sqlx::query("INSERT INTO classes (id, name, default_balance) VALUES (?, ?, ?)")
            .bind(class.id.to_string())
            .bind(&class.name)
            .bind(class.default_balance.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to create class")?;

        info!("Created class {} ({})", class.name, class.id);
        Ok(class)
    }

    async fn enroll(
        &self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> std::result::Result<Decimal, EnrollmentError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin enrollment")?;

        let class_row = sqlx::query("SELECT default_balance FROM classes WHERE id = ?")
            .bind(class_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load class")?;

        let Some(class_row) = class_row else {
            return Err(EnrollmentError::ClassNotFound { class_id });
        };
        let opening_balance = decimal_column(&class_row, "default_balance")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO class_balances (student_id, class_id, balance)
            VALUES (?, ?, ?)
            ON CONFLICT(student_id, class_id) DO NOTHING
            "#,
        )
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .bind(opening_balance.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to create class balance")?;

        if inserted.rows_affected() == 0 {
            return Err(EnrollmentError::AlreadyEnrolled {
                student_id,
                class_id,
            });
        }

        tx.commit().await.context("Failed to commit enrollment")?;

        info!(
            "Enrolled student {} in class {} with ${}",
            student_id, class_id, opening_balance
        );
        Ok(opening_balance)
    }

    async fn holdings_by_class(&self) -> Result<BTreeMap<ClassId, Vec<EnrollmentHoldings>>> {
        let rows = sqlx::query(
            r#"
            SELECT cb.class_id AS class_id, cb.student_id AS student_id,
                   l.symbol AS symbol, l.quantity AS quantity
            FROM class_balances cb
            LEFT JOIN lots l ON l.student_id = cb.student_id AND l.class_id = cb.class_id
            ORDER BY cb.class_id, cb.student_id, l.symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load holdings")?;

        // Quantities are TEXT, so sum per symbol here rather than in SQL
        let mut grouped: BTreeMap<ClassId, BTreeMap<StudentId, BTreeMap<String, Decimal>>> =
            BTreeMap::new();
        for row in &rows {
            let class_id = uuid_column(row, "class_id")?;
            let student_id = uuid_column(row, "student_id")?;
            let symbols = grouped
                .entry(class_id)
                .or_default()
                .entry(student_id)
                .or_default();

            let symbol: Option<String> = row.try_get("symbol")?;
            if let Some(symbol) = symbol {
                let quantity = decimal_column(row, "quantity")?;
                *symbols.entry(symbol).or_insert(Decimal::ZERO) += quantity;
            }
        }

        Ok(grouped
            .into_iter()
            .map(|(class_id, students)| {
                let enrollments = students
                    .into_iter()
                    .map(|(student_id, symbols)| EnrollmentHoldings {
                        student_id,
                        class_id,
                        holdings: symbols
                            .into_iter()
                            .map(|(symbol, quantity)| Holding { symbol, quantity })
                            .collect(),
                    })
                    .collect();
                (class_id, enrollments)
            })
            .collect())
    }

    async fn class_standings(&self, class_id: ClassId) -> Result<Vec<StudentStanding>> {
        let enrollment_rows = sqlx::query("SELECT student_id FROM class_balances WHERE class_id = ?")
            .bind(class_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to load class enrollments")?;

        let transaction_rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE class_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(class_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load class transactions")?;

        let mut standings: HashMap<StudentId, StudentStanding> = HashMap::new();
        for row in &enrollment_rows {
            let student_id = uuid_column(row, "student_id")?;
            standings.insert(
                student_id,
                StudentStanding {
                    student_id,
                    realized_profit: Decimal::ZERO,
                    transaction_count: 0,
                },
            );
        }

        for row in &transaction_rows {
            let transaction = map_transaction(row)?;
            let standing = standings
                .entry(transaction.student_id)
                .or_insert_with(|| StudentStanding {
                    student_id: transaction.student_id,
                    realized_profit: Decimal::ZERO,
                    transaction_count: 0,
                });
            standing.realized_profit += transaction.realized_profit();
            standing.transaction_count += 1;
        }

        // Per-share averages are stored at full precision; report totals in cents
        let mut standings: Vec<StudentStanding> = standings
            .into_values()
            .map(|mut standing| {
                standing.realized_profit = standing.realized_profit.round_dp(2).normalize();
                standing
            })
            .collect();
        standings.sort_by(|a, b| {
            b.realized_profit
                .cmp(&a.realized_profit)
                .then_with(|| b.transaction_count.cmp(&a.transaction_count))
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        Ok(standings)
    }
}
