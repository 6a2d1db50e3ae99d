use super::map_snapshot;
use crate::domain::ledger::{ClassId, StudentId};
use crate::domain::repositories::SnapshotRepository;
use crate::domain::valuation::PortfolioSnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn save_all(&self, snapshots: &[PortfolioSnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin snapshot batch")?;

        for snapshot in snapshots {
            sqlx::query(
                r#"
                INSERT INTO portfolio_snapshots (id, student_id, class_id, valuation, calculated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(snapshot.id.to_string())
            .bind(snapshot.student_id.to_string())
            .bind(snapshot.class_id.to_string())
            .bind(snapshot.valuation.to_string())
            .bind(snapshot.calculated_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .context("Failed to save portfolio snapshot")?;
        }

        tx.commit()
            .await
            .context("Failed to commit snapshot batch")?;

        debug!("Persisted {} portfolio snapshots", snapshots.len());
        Ok(())
    }

    async fn history(
        &self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> Result<Vec<PortfolioSnapshot>> {
        let rows = sqlx::query(
            "SELECT id, student_id, class_id, valuation, calculated_at FROM portfolio_snapshots \
             WHERE student_id = ? AND class_id = ? ORDER BY calculated_at ASC, rowid ASC",
        )
        .bind(student_id.to_string())
        .bind(class_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load snapshot history")?;

        rows.iter().map(map_snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::Database;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_history_is_oldest_first() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteSnapshotRepository::new(db.pool.clone());
        let student = Uuid::new_v4();
        let class = Uuid::new_v4();
        let now = Utc::now();

        repo.save_all(&[
            PortfolioSnapshot::new(student, class, dec!(1500.25), now),
            PortfolioSnapshot::new(student, class, dec!(1400), now - Duration::days(1)),
            PortfolioSnapshot::new(Uuid::new_v4(), class, dec!(99), now),
        ])
        .await
        .unwrap();

        let history = repo.history(student, class).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].valuation, dec!(1400));
        assert_eq!(history[1].valuation, dec!(1500.25));
    }

    #[tokio::test]
    async fn test_save_empty_batch_is_noop() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteSnapshotRepository::new(db.pool.clone());

        repo.save_all(&[]).await.unwrap();
        assert!(
            repo.history(Uuid::new_v4(), Uuid::new_v4())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
