use crate::domain::ledger::{ClassId, StudentId};
use crate::domain::ports::BulkQuote;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Valuation of one student's holdings in one class at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: Uuid,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub valuation: Decimal,
    pub calculated_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn new(
        student_id: StudentId,
        class_id: ClassId,
        valuation: Decimal,
        calculated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            class_id,
            valuation,
            calculated_at,
        }
    }
}

/// Aggregate quantity of one symbol (all lots summed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
}

/// One enrollment and what it currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentHoldings {
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub holdings: Vec<Holding>,
}

impl EnrollmentHoldings {
    pub fn has_positions(&self) -> bool {
        self.holdings.iter().any(|h| h.quantity > Decimal::ZERO)
    }
}

/// Distinct symbols held by anyone in a class, sorted for a stable bulk request.
pub fn distinct_symbols(enrollments: &[EnrollmentHoldings]) -> Vec<String> {
    enrollments
        .iter()
        .flat_map(|e| e.holdings.iter().map(|h| h.symbol.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sum of quantity x quoted price. A symbol without a quote contributes zero.
pub fn value_holdings(holdings: &[Holding], quotes: &HashMap<String, BulkQuote>) -> Decimal {
    holdings
        .iter()
        .map(|h| {
            let price = quotes.get(&h.symbol).map(|q| q.price).unwrap_or(Decimal::ZERO);
            h.quantity * price
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn holding(symbol: &str, quantity: Decimal) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_missing_quote_contributes_zero() {
        let holdings = vec![holding("A", dec!(10)), holding("B", dec!(3))];
        let mut quotes = HashMap::new();
        quotes.insert("A".to_string(), BulkQuote::new("A", dec!(12.5)));

        assert_eq!(value_holdings(&holdings, &quotes), dec!(125));
    }

    #[test]
    fn test_distinct_symbols_across_students() {
        let class_id = Uuid::new_v4();
        let enrollments = vec![
            EnrollmentHoldings {
                student_id: Uuid::new_v4(),
                class_id,
                holdings: vec![holding("C", dec!(1)), holding("A", dec!(1))],
            },
            EnrollmentHoldings {
                student_id: Uuid::new_v4(),
                class_id,
                holdings: vec![holding("A", dec!(2)), holding("B", dec!(1))],
            },
            EnrollmentHoldings {
                student_id: Uuid::new_v4(),
                class_id,
                holdings: vec![],
            },
        ];

        assert_eq!(distinct_symbols(&enrollments), vec!["A", "B", "C"]);
        assert!(!enrollments[2].has_positions());
    }
}
