use super::{ClassId, StudentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Buy,
    Sell,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Buy => write!(f, "BUY"),
            TransactionKind::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TransactionKind::Buy),
            "SELL" => Ok(TransactionKind::Sell),
            _ => anyhow::bail!("Invalid transaction kind: {}", s),
        }
    }
}

/// Immutable audit record of one settled trade.
///
/// `amount` is signed: positive shares for a buy, negative for a sell.
/// `net_profit` is only set on sells and holds the average realized profit
/// per share across the FIFO lots the sell consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub symbol: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub price: Decimal,
    pub balance_after: Decimal,
    pub net_profit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn buy(
        student_id: StudentId,
        class_id: ClassId,
        symbol: String,
        quantity: Decimal,
        price: Decimal,
        balance_after: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            class_id,
            symbol,
            kind: TransactionKind::Buy,
            amount: quantity,
            price,
            balance_after,
            net_profit: None,
            created_at,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sell(
        student_id: StudentId,
        class_id: ClassId,
        symbol: String,
        quantity: Decimal,
        price: Decimal,
        balance_after: Decimal,
        net_profit: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            class_id,
            symbol,
            kind: TransactionKind::Sell,
            amount: -quantity,
            price,
            balance_after,
            net_profit: Some(net_profit),
            created_at,
        }
    }

    /// Unsigned number of shares moved
    pub fn quantity(&self) -> Decimal {
        self.amount.abs()
    }

    /// Realized profit of the whole trade (zero for buys)
    pub fn realized_profit(&self) -> Decimal {
        self.net_profit
            .map(|per_share| per_share * self.quantity())
            .unwrap_or(Decimal::ZERO)
    }
}
