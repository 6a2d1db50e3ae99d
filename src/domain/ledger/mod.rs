//! Ledger entities: enrollments, lots, the transaction log and the
//! per-student ledger view returned after every settled trade.

mod lot;
mod transaction;
mod view;

pub use lot::{Lot, total_quantity};
pub use transaction::{Transaction, TransactionKind};
pub use view::{ClassLedger, LedgerView, PositionView};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StudentId = Uuid;
pub type ClassId = Uuid;

/// Starting cash used when a class is created without an explicit balance.
pub const DEFAULT_CLASS_BALANCE: Decimal = dec!(20000.00);

/// A class run by an instructor. Enrollments are seeded with `default_balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub default_balance: Decimal,
}

impl Class {
    pub fn new(name: impl Into<String>, default_balance: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            default_balance,
        }
    }
}

/// Leaderboard row for one student of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStanding {
    pub student_id: StudentId,
    /// Sum over sells of average realized profit per share times shares sold
    pub realized_profit: Decimal,
    pub transaction_count: usize,
}

/// Normalize a ticker the way every ledger key stores it.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
        assert_eq!(normalize_symbol("brk.b"), "BRK.B");
        assert_eq!(normalize_symbol("   "), "");
    }

    #[test]
    fn test_new_class_gets_fresh_id() {
        let a = Class::new("Econ 101", DEFAULT_CLASS_BALANCE);
        let b = Class::new("Econ 101", DEFAULT_CLASS_BALANCE);
        assert_ne!(a.id, b.id);
        assert_eq!(a.default_balance, dec!(20000));
    }
}
