use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::repositories::{LedgerRepository, SnapshotRepository};
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repositories::{
    SqliteLedgerRepository, SqliteSnapshotRepository,
};

pub struct PersistenceHandle {
    pub db: Database,
    pub ledger_repository: Arc<dyn LedgerRepository>,
    pub snapshot_repository: Arc<dyn SnapshotRepository>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(db_url: &str) -> Result<PersistenceHandle> {
        info!("Initializing Database at {}", db_url);

        let db = Database::new(db_url)
            .await
            .context("Failed to initialize database")?;

        Ok(Self::from_database(db))
    }

    /// Wire repositories over an already opened database
    pub fn from_database(db: Database) -> PersistenceHandle {
        let ledger_repository = Arc::new(SqliteLedgerRepository::new(db.pool.clone()));
        let snapshot_repository = Arc::new(SqliteSnapshotRepository::new(db.pool.clone()));

        PersistenceHandle {
            db,
            ledger_repository,
            snapshot_repository,
        }
    }
}
