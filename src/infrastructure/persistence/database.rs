use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Settlements wait this long for a concurrent writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger database handle
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .journal_mode(SqliteJournalMode::Wal); // Readers never block the settlement writer

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Each in-memory connection is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory SQLite database")?;

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Classes
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                default_balance TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create classes table")?;

        // 2. Per-class cash balances (one row per enrollment)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS class_balances (
                student_id TEXT NOT NULL,
                class_id TEXT NOT NULL,
                balance TEXT NOT NULL,
                PRIMARY KEY (student_id, class_id)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create class_balances table")?;

        // 3. Lots. `seq` breaks purchase-time ties in insertion order.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lots (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                class_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                quantity TEXT NOT NULL,
                purchase_price TEXT NOT NULL,
                purchased_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lots_holding
            ON lots (student_id, class_id, symbol, purchased_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create lots table")?;

        // 4. Append-only transaction log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                class_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount TEXT NOT NULL,
                price TEXT NOT NULL,
                balance_after TEXT NOT NULL,
                net_profit TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_student
            ON transactions (student_id, class_id, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create transactions table")?;

        // 5. Portfolio valuation snapshots
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS portfolio_snapshots (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                class_id TEXT NOT NULL,
                valuation TEXT NOT NULL,
                calculated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_enrollment_time
            ON portfolio_snapshots (student_id, class_id, calculated_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create portfolio_snapshots table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_in_memory_schema_created() {
        let db = Database::in_memory().await.expect("in-memory db");

        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name IN \
             ('classes', 'class_balances', 'lots', 'transactions', 'portfolio_snapshots')",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();

        let count: i64 = row.try_get("count").unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.init().await.expect("second init should be a no-op");
    }

    #[test]
    fn test_file_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.db");
        let url = format!("sqlite://{}", path.display());

        tokio_test::block_on(async {
            let db = tokio_test::assert_ok!(Database::new(&url).await);
            db.pool.close().await;
        });

        assert!(path.exists());
    }
}
