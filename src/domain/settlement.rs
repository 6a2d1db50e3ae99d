//! Settlement planning
//!
//! Pure functions that turn a validated trade request, the locked ledger rows
//! and a quoted price into the exact set of writes a settlement performs.
//! Nothing here touches storage, so every rule (funds check, holdings check,
//! FIFO lot consumption, average realized profit) is unit-testable in isolation.

use crate::domain::errors::SettlementError;
use crate::domain::ledger::{
    ClassId, Lot, StudentId, Transaction, normalize_symbol, total_quantity,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A buy or sell request after input validation
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub symbol: String,
    pub quantity: Decimal,
}

impl TradeRequest {
    pub fn new(
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<Self, SettlementError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(SettlementError::InvalidOrder {
                reason: "symbol is empty".to_string(),
            });
        }
        if quantity <= Decimal::ZERO {
            return Err(SettlementError::InvalidOrder {
                reason: format!("quantity must be positive, got {}", quantity),
            });
        }

        Ok(Self {
            student_id,
            class_id,
            symbol,
            quantity,
        })
    }
}

/// Writes for a settled buy
#[derive(Debug, Clone, PartialEq)]
pub struct BuyPlan {
    pub cost: Decimal,
    pub new_balance: Decimal,
    pub lot: Lot,
    pub transaction: Transaction,
}

/// What happens to one lot during a sell
#[derive(Debug, Clone, PartialEq)]
pub enum LotChange {
    /// Fully consumed, delete the row
    Remove { lot_id: Uuid },
    /// Partially consumed, keep the row with the remaining quantity
    Reduce { lot_id: Uuid, remaining: Decimal },
}

/// Writes for a settled sell
#[derive(Debug, Clone, PartialEq)]
pub struct SellPlan {
    pub proceeds: Decimal,
    pub new_balance: Decimal,
    pub lot_changes: Vec<LotChange>,
    pub consumed: Decimal,
    pub net_profit: Decimal,
    pub transaction: Transaction,
}

/// `price x quantity`, rejecting arithmetic overflow as an invalid order.
pub fn trade_value(price: Decimal, quantity: Decimal) -> Result<Decimal, SettlementError> {
    price
        .checked_mul(quantity)
        .ok_or_else(|| SettlementError::InvalidOrder {
            reason: format!("trade value overflows: {} x {}", price, quantity),
        })
}

/// Reject a buy whose cost exceeds the available balance. Returns the cost.
pub fn check_funds(
    balance: Decimal,
    price: Decimal,
    quantity: Decimal,
) -> Result<Decimal, SettlementError> {
    let cost = trade_value(price, quantity)?;
    if cost > balance {
        return Err(SettlementError::InsufficientFunds {
            need: cost,
            available: balance,
        });
    }
    Ok(cost)
}

/// Reject a sell larger than the shares held across `lots`. Returns the held total.
pub fn check_holdings(
    symbol: &str,
    lots: &[Lot],
    quantity: Decimal,
) -> Result<Decimal, SettlementError> {
    let held = total_quantity(lots);
    if held < quantity {
        return Err(SettlementError::InsufficientHoldings {
            symbol: symbol.to_string(),
            requested: quantity,
            held,
        });
    }
    Ok(held)
}

pub fn plan_buy(
    request: &TradeRequest,
    balance: Decimal,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<BuyPlan, SettlementError> {
    let cost = check_funds(balance, price, request.quantity)?;
    let new_balance = balance - cost;

    let lot = Lot::new(
        request.student_id,
        request.class_id,
        request.symbol.clone(),
        request.quantity,
        price,
        now,
    );
    let transaction = Transaction::buy(
        request.student_id,
        request.class_id,
        request.symbol.clone(),
        request.quantity,
        price,
        new_balance,
        now,
    );

    Ok(BuyPlan {
        cost,
        new_balance,
        lot,
        transaction,
    })
}

/// Plan a sell against `lots`, consuming them oldest purchase first.
///
/// `net_profit` is the average realized profit per share over every lot
/// touched: `sum((price - lot.purchase_price) * consumed_from_lot) / consumed`.
pub fn plan_sell(
    request: &TradeRequest,
    balance: Decimal,
    lots: &[Lot],
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<SellPlan, SettlementError> {
    check_holdings(&request.symbol, lots, request.quantity)?;
    let proceeds = trade_value(price, request.quantity)?;
    let new_balance = balance
        .checked_add(proceeds)
        .ok_or_else(|| SettlementError::InvalidOrder {
            reason: "balance overflows".to_string(),
        })?;

    // Stable sort keeps load order for lots bought at the same instant.
    let mut ordered: Vec<&Lot> = lots.iter().collect();
    ordered.sort_by_key(|lot| lot.purchased_at);

    let mut remaining = request.quantity;
    let mut consumed = Decimal::ZERO;
    let mut total_profit = Decimal::ZERO;
    let mut lot_changes = Vec::new();

    for lot in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        if lot.quantity <= Decimal::ZERO {
            continue;
        }

        let take = remaining.min(lot.quantity);
        total_profit += (price - lot.purchase_price) * take;
        consumed += take;
        remaining -= take;

        if take == lot.quantity {
            lot_changes.push(LotChange::Remove { lot_id: lot.id });
        } else {
            lot_changes.push(LotChange::Reduce {
                lot_id: lot.id,
                remaining: lot.quantity - take,
            });
        }
    }

    let net_profit = if consumed.is_zero() {
        Decimal::ZERO
    } else {
        total_profit / consumed
    };

    let transaction = Transaction::sell(
        request.student_id,
        request.class_id,
        request.symbol.clone(),
        request.quantity,
        price,
        new_balance,
        net_profit,
        now,
    );

    Ok(SellPlan {
        proceeds,
        new_balance,
        lot_changes,
        consumed,
        net_profit,
        transaction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn request(quantity: Decimal) -> TradeRequest {
        TradeRequest::new(Uuid::new_v4(), Uuid::new_v4(), "xyz", quantity).unwrap()
    }

    fn lot_at(req: &TradeRequest, quantity: Decimal, price: Decimal, day: i64) -> Lot {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        Lot::new(
            req.student_id,
            req.class_id,
            req.symbol.clone(),
            quantity,
            price,
            base + Duration::days(day),
        )
    }

    #[test]
    fn test_request_normalizes_and_validates() {
        let req = request(dec!(1.5));
        assert_eq!(req.symbol, "XYZ");

        let zero = TradeRequest::new(Uuid::new_v4(), Uuid::new_v4(), "XYZ", dec!(0));
        assert!(matches!(zero, Err(SettlementError::InvalidOrder { .. })));

        let negative = TradeRequest::new(Uuid::new_v4(), Uuid::new_v4(), "XYZ", dec!(-3));
        assert!(matches!(negative, Err(SettlementError::InvalidOrder { .. })));

        let blank = TradeRequest::new(Uuid::new_v4(), Uuid::new_v4(), "  ", dec!(1));
        assert!(matches!(blank, Err(SettlementError::InvalidOrder { .. })));
    }

    #[test]
    fn test_buy_decrements_balance_and_creates_lot() {
        let req = request(dec!(10));
        let plan = plan_buy(&req, dec!(1000), dec!(50.00), Utc::now()).unwrap();

        assert_eq!(plan.cost, dec!(500));
        assert_eq!(plan.new_balance, dec!(500.00));
        assert_eq!(plan.lot.quantity, dec!(10));
        assert_eq!(plan.lot.purchase_price, dec!(50));
        assert_eq!(plan.transaction.balance_after, dec!(500));
        assert_eq!(plan.transaction.net_profit, None);
    }

    #[test]
    fn test_buy_exactly_spending_balance_is_allowed() {
        let req = request(dec!(4));
        let plan = plan_buy(&req, dec!(100), dec!(25), Utc::now()).unwrap();
        assert_eq!(plan.new_balance, Decimal::ZERO);
    }

    #[test]
    fn test_buy_rejects_insufficient_funds() {
        let req = request(dec!(3));
        let result = plan_buy(&req, dec!(100), dec!(33.34), Utc::now());

        match result {
            Err(SettlementError::InsufficientFunds { need, available }) => {
                assert_eq!(need, dec!(100.02));
                assert_eq!(available, dec!(100));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
    }

    #[test]
    fn test_buy_overflow_is_invalid_order() {
        let req = request(Decimal::MAX);
        let result = plan_buy(&req, Decimal::MAX, dec!(2), Utc::now());
        assert!(matches!(result, Err(SettlementError::InvalidOrder { .. })));
    }

    #[test]
    fn test_fifo_sell_consumes_oldest_lot_first() {
        let req = request(dec!(7));
        // Newest lot listed first to prove ordering is by purchase date.
        let lots = vec![
            lot_at(&req, dec!(5), dec!(20), 2),
            lot_at(&req, dec!(5), dec!(10), 1),
        ];

        let plan = plan_sell(&req, dec!(0), &lots, dec!(30), Utc::now()).unwrap();

        assert_eq!(plan.proceeds, dec!(210));
        assert_eq!(plan.new_balance, dec!(210));
        assert_eq!(plan.consumed, dec!(7));
        assert_eq!(
            plan.lot_changes,
            vec![
                LotChange::Remove { lot_id: lots[1].id },
                LotChange::Reduce {
                    lot_id: lots[0].id,
                    remaining: dec!(3)
                },
            ]
        );
        // (30-10)*5 + (30-20)*2 = 120 over 7 shares
        assert_eq!(plan.net_profit, dec!(120) / dec!(7));
        assert_eq!(plan.net_profit.round_dp(2), dec!(17.14));
        assert_eq!(plan.transaction.net_profit, Some(plan.net_profit));
        assert_eq!(plan.transaction.amount, dec!(-7));
    }

    #[test]
    fn test_sell_whole_position_removes_every_lot() {
        let req = request(dec!(10));
        let lots = vec![lot_at(&req, dec!(10), dec!(50), 0)];

        let plan = plan_sell(&req, dec!(500), &lots, dec!(60), Utc::now()).unwrap();

        assert_eq!(plan.new_balance, dec!(1100));
        assert_eq!(plan.net_profit, dec!(10));
        assert_eq!(plan.lot_changes, vec![LotChange::Remove { lot_id: lots[0].id }]);
    }

    #[test]
    fn test_sell_more_than_held_is_rejected() {
        let req = request(dec!(11));
        let lots = vec![
            lot_at(&req, dec!(5), dec!(10), 0),
            lot_at(&req, dec!(5.5), dec!(10), 1),
        ];

        match plan_sell(&req, dec!(0), &lots, dec!(12), Utc::now()) {
            Err(SettlementError::InsufficientHoldings {
                requested, held, ..
            }) => {
                assert_eq!(requested, dec!(11));
                assert_eq!(held, dec!(10.5));
            }
            other => panic!("expected InsufficientHoldings, got {:?}", other),
        }
    }

    #[test]
    fn test_sell_with_no_lots_is_rejected() {
        let req = request(dec!(1));
        let result = plan_sell(&req, dec!(1000), &[], dec!(12), Utc::now());
        assert!(matches!(
            result,
            Err(SettlementError::InsufficientHoldings { .. })
        ));
    }

    #[test]
    fn test_average_profit_depends_on_lot_mix() {
        // Same quantity and price, different lots touched: different netProfit.
        let req = request(dec!(2));
        let cheap_first = vec![
            lot_at(&req, dec!(1), dec!(10), 0),
            lot_at(&req, dec!(5), dec!(20), 1),
        ];
        let dear_first = vec![
            lot_at(&req, dec!(5), dec!(20), 0),
            lot_at(&req, dec!(1), dec!(10), 1),
        ];

        let a = plan_sell(&req, dec!(0), &cheap_first, dec!(30), Utc::now()).unwrap();
        let b = plan_sell(&req, dec!(0), &dear_first, dec!(30), Utc::now()).unwrap();

        assert_eq!(a.net_profit, dec!(15));
        assert_eq!(b.net_profit, dec!(10));
    }

    #[test]
    fn test_fractional_shares_leave_fractional_remainder() {
        let req = request(dec!(0.25));
        let lots = vec![lot_at(&req, dec!(1.5), dec!(100), 0)];

        let plan = plan_sell(&req, dec!(0), &lots, dec!(80), Utc::now()).unwrap();

        assert_eq!(plan.proceeds, dec!(20));
        assert_eq!(plan.net_profit, dec!(-20));
        assert_eq!(
            plan.lot_changes,
            vec![LotChange::Reduce {
                lot_id: lots[0].id,
                remaining: dec!(1.25)
            }]
        );
    }
}
