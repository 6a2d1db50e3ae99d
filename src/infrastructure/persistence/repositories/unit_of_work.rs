use super::{LOT_COLUMNS, decimal_column, map_lot};
use crate::domain::ledger::{ClassId, Lot, StudentId, Transaction};
use crate::domain::repositories::LedgerUnitOfWork;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction as SqlxTransaction};
use tracing::debug;
use uuid::Uuid;

/// Ledger writes on one SQLite transaction.
///
/// The transaction rolls back if the unit is dropped before `commit`.
pub struct SqliteUnitOfWork {
    tx: Option<SqlxTransaction<'static, Sqlite>>,
}

impl SqliteUnitOfWork {
    pub fn new(tx: SqlxTransaction<'static, Sqlite>) -> Self {
        Self { tx: Some(tx) }
    }

    fn tx(&mut self) -> Result<&mut SqlxTransaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .context("Ledger unit of work already committed or rolled back")
    }
}

#[async_trait]
impl LedgerUnitOfWork for SqliteUnitOfWork {
    async fn lock_balance(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> Result<Option<Decimal>> {
        let tx = self.tx()?;

        // A write as the first statement takes the database write lock
        // through the busy handler, so concurrent settlements queue here
        // instead of failing at commit.
        let locked = sqlx::query(
            "UPDATE class_balances SET balance = balance WHERE student_id = ? AND class_id = ?",
        )
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .execute(&mut **tx)
        .await
        .context("Failed to lock class balance")?;

        if locked.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT balance FROM class_balances WHERE student_id = ? AND class_id = ?",
        )
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .fetch_one(&mut **tx)
        .await
        .context("Failed to read locked class balance")?;

        Ok(Some(decimal_column(&row, "balance")?))
    }

    async fn lots(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
    ) -> Result<Vec<Lot>> {
        let tx = self.tx()?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM lots WHERE student_id = ? AND class_id = ? AND symbol = ? \
             ORDER BY purchased_at ASC, seq ASC",
            LOT_COLUMNS
        ))
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .bind(symbol)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to load lots")?;

        rows.iter().map(map_lot).collect()
    }

    async fn set_balance(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
        balance: Decimal,
    ) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "UPDATE class_balances SET balance = ? WHERE student_id = ? AND class_id = ?",
        )
        .bind(balance.to_string())
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .execute(&mut **tx)
        .await
        .context("Failed to update class balance")?;

        if result.rows_affected() != 1 {
            anyhow::bail!(
                "Class balance for student {} in class {} disappeared mid-settlement",
                student_id,
                class_id
            );
        }
        Ok(())
    }

    async fn insert_lot(&mut self, lot: &Lot) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO lots (id, student_id, class_id, symbol, quantity, purchase_price, purchased_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(lot.id.to_string())
        .bind(lot.student_id.to_string())
        .bind(lot.class_id.to_string())
        .bind(&lot.symbol)
        .bind(lot.quantity.to_string())
        .bind(lot.purchase_price.to_string())
        .bind(lot.purchased_at.timestamp_millis())
        .execute(&mut **tx)
        .await
        .context("Failed to insert lot")?;

        debug!("Inserted lot {} ({} {})", lot.id, lot.quantity, lot.symbol);
        Ok(())
    }

    async fn update_lot_quantity(&mut self, lot_id: Uuid, quantity: Decimal) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query("UPDATE lots SET quantity = ? WHERE id = ?")
            .bind(quantity.to_string())
            .bind(lot_id.to_string())
            .execute(&mut **tx)
            .await
            .context("Failed to reduce lot")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Lot {} not found", lot_id);
        }
        Ok(())
    }

    async fn delete_lot(&mut self, lot_id: Uuid) -> Result<()> {
        let tx = self.tx()?;
        let result = sqlx::query("DELETE FROM lots WHERE id = ?")
            .bind(lot_id.to_string())
            .execute(&mut **tx)
            .await
            .context("Failed to delete lot")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("Lot {} not found", lot_id);
        }
        Ok(())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO transactions
            (id, student_id, class_id, symbol, kind, amount, price, balance_after, net_profit, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.student_id.to_string())
        .bind(transaction.class_id.to_string())
        .bind(&transaction.symbol)
        .bind(transaction.kind.to_string())
        .bind(transaction.amount.to_string())
        .bind(transaction.price.to_string())
        .bind(transaction.balance_after.to_string())
        .bind(transaction.net_profit.map(|p| p.to_string()))
        .bind(transaction.created_at.timestamp_millis())
        .execute(&mut **tx)
        .await
        .context("Failed to append transaction")?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .context("Ledger unit of work already committed or rolled back")?;
        tx.commit().await.context("Failed to commit ledger write")?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        // Nothing to undo once committed or rolled back
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .context("Failed to roll back ledger write")?;
        }
        Ok(())
    }
}
