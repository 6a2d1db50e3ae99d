use super::{ClassId, StudentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One purchase of a symbol. Lots are never merged so FIFO cost basis survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub symbol: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub purchased_at: DateTime<Utc>,
}

impl Lot {
    pub fn new(
        student_id: StudentId,
        class_id: ClassId,
        symbol: String,
        quantity: Decimal,
        purchase_price: Decimal,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            class_id,
            symbol,
            quantity,
            purchase_price,
            purchased_at,
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.purchase_price
    }
}

/// Total quantity across a set of lots
pub fn total_quantity(lots: &[Lot]) -> Decimal {
    lots.iter().map(|lot| lot.quantity).sum()
}
