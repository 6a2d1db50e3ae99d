//! Repository Pattern Abstractions
//!
//! Storage seams for the ledger. Reads return materialized value objects;
//! every mutation of balances, lots and the transaction log goes through a
//! `LedgerUnitOfWork`, which either commits all of its writes or none.
//!
//! # Example
//!
//! ```rust,no_run
//! use stocksim::domain::repositories::LedgerRepository;
//! use stocksim::infrastructure::persistence::{Database, SqliteLedgerRepository};
//!
//! # async {
//! let db = Database::in_memory().await?;
//! let ledger = SqliteLedgerRepository::new(db.pool.clone());
//! let mut unit = ledger.begin().await?;
//! // unit.lock_balance(..), unit.set_balance(..), unit.append_transaction(..)
//! unit.commit().await?;
//! # anyhow::Ok(())
//! # };
//! ```

use crate::domain::errors::EnrollmentError;
use crate::domain::ledger::{
    Class, ClassId, LedgerView, Lot, StudentId, StudentStanding, Transaction,
};
use crate::domain::valuation::{EnrollmentHoldings, PortfolioSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// One all-or-nothing ledger write.
///
/// Dropping a unit without calling `commit` discards every write made through it.
#[async_trait]
pub trait LedgerUnitOfWork: Send {
    /// Lock the enrollment row for writing and return its balance.
    /// `None` when the student is not enrolled in the class.
    async fn lock_balance(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> Result<Option<Decimal>>;

    /// Lots of one symbol, oldest purchase first
    async fn lots(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
    ) -> Result<Vec<Lot>>;

    async fn set_balance(
        &mut self,
        student_id: StudentId,
        class_id: ClassId,
        balance: Decimal,
    ) -> Result<()>;

    async fn insert_lot(&mut self, lot: &Lot) -> Result<()>;

    async fn update_lot_quantity(&mut self, lot_id: Uuid, quantity: Decimal) -> Result<()>;

    async fn delete_lot(&mut self, lot_id: Uuid) -> Result<()>;

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Balances, lots, the transaction log and enrollment
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Open a unit of work for one settlement
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>>;

    /// Cash balance of an enrollment, `None` if not enrolled
    async fn balance(&self, student_id: StudentId, class_id: ClassId) -> Result<Option<Decimal>>;

    /// Lots of one symbol, oldest purchase first
    async fn lots(&self, student_id: StudentId, class_id: ClassId, symbol: &str)
    -> Result<Vec<Lot>>;

    /// Every class of the student with balance, positions and transactions
    async fn ledger_view(&self, student_id: StudentId) -> Result<LedgerView>;

    async fn create_class(&self, name: &str, default_balance: Decimal) -> Result<Class>;

    /// Create the enrollment seeded with the class default balance, returning that balance.
    async fn enroll(
        &self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> std::result::Result<Decimal, EnrollmentError>;

    /// Every enrollment with its aggregated holdings, grouped by class
    async fn holdings_by_class(&self) -> Result<BTreeMap<ClassId, Vec<EnrollmentHoldings>>>;

    /// Realized profit and activity per enrolled student, best first
    async fn class_standings(&self, class_id: ClassId) -> Result<Vec<StudentStanding>>;
}

/// Persisted portfolio valuations
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Write a batch of snapshots atomically
    async fn save_all(&self, snapshots: &[PortfolioSnapshot]) -> Result<()>;

    /// Snapshots of one enrollment, oldest first
    async fn history(
        &self,
        student_id: StudentId,
        class_id: ClassId,
    ) -> Result<Vec<PortfolioSnapshot>>;
}
