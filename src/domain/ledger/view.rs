use super::{ClassId, Lot, StudentId, Transaction, total_quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every class a student is enrolled in, with balance, open positions and
/// the transaction log. Returned after each settled trade so callers can
/// re-render complete state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerView {
    pub student_id: StudentId,
    pub classes: Vec<ClassLedger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLedger {
    pub class_id: ClassId,
    /// Absent when the class is managed outside this store
    pub class_name: Option<String>,
    pub balance: Decimal,
    pub positions: Vec<PositionView>,
    pub transactions: Vec<Transaction>,
}

/// All open lots of one symbol, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub quantity: Decimal,
    /// Sum of quantity x purchase price over the open lots
    pub cost_basis: Decimal,
    pub lots: Vec<Lot>,
}

impl PositionView {
    pub fn from_lots(symbol: String, lots: Vec<Lot>) -> Self {
        Self {
            symbol,
            quantity: total_quantity(&lots),
            cost_basis: lots.iter().map(Lot::cost_basis).sum(),
            lots,
        }
    }
}

impl LedgerView {
    pub fn class(&self, class_id: ClassId) -> Option<&ClassLedger> {
        self.classes.iter().find(|c| c.class_id == class_id)
    }

    pub fn balance(&self, class_id: ClassId) -> Option<Decimal> {
        self.class(class_id).map(|c| c.balance)
    }
}

impl ClassLedger {
    pub fn position(&self, symbol: &str) -> Option<&PositionView> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    /// Shares held of `symbol`, zero when there is no position
    pub fn held_quantity(&self, symbol: &str) -> Decimal {
        self.position(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }
}
