//! Trade Settlement Engine
//!
//! Executes one buy or one sell as an atomic ledger transition:
//!
//! 1. Validate the request and read the enrollment balance (and lots for a sell)
//! 2. Fetch a live quote, bounded by `quote_timeout`
//! 3. Open a unit of work, lock the enrollment row and re-check funds/holdings
//!    against the locked state
//! 4. Write balance, lots and the transaction, then commit
//! 5. Return the student's full ledger view
//!
//! Every rejection in steps 1-3 leaves the ledger untouched. A failure in
//! step 4 rolls the unit of work back.

use crate::domain::errors::{QuoteError, SettlementError};
use crate::domain::ledger::{ClassId, LedgerView, StudentId};
use crate::domain::ports::QuoteGateway;
use crate::domain::repositories::{LedgerRepository, LedgerUnitOfWork};
use crate::domain::settlement::{
    BuyPlan, LotChange, SellPlan, TradeRequest, check_funds, check_holdings, plan_buy, plan_sell,
};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct SettlementEngine {
    ledger: Arc<dyn LedgerRepository>,
    quotes: Arc<dyn QuoteGateway>,
    quote_timeout: Duration,
    metrics: Option<Metrics>,
}

impl SettlementEngine {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        quotes: Arc<dyn QuoteGateway>,
        quote_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            quotes,
            quote_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Buy `quantity` shares of `symbol` at the live price.
    pub async fn buy(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<LedgerView, SettlementError> {
        let result = self.settle_buy(student_id, class_id, symbol, quantity).await;
        self.record("buy", &result);
        result
    }

    /// Sell `quantity` shares of `symbol` at the live price, oldest lots first.
    pub async fn sell(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<LedgerView, SettlementError> {
        let result = self.settle_sell(student_id, class_id, symbol, quantity).await;
        self.record("sell", &result);
        result
    }

    /// Current ledger view of a student, without trading
    pub async fn ledger_view(&self, student_id: StudentId) -> anyhow::Result<LedgerView> {
        self.ledger.ledger_view(student_id).await
    }

    async fn settle_buy(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<LedgerView, SettlementError> {
        let request = TradeRequest::new(student_id, class_id, symbol, quantity)?;

        let balance = self.require_balance(&request).await?;
        let price = self.fetch_price(&request.symbol).await?;
        check_funds(balance, price, request.quantity)?;

        let mut unit = self
            .ledger
            .begin()
            .await
            .map_err(SettlementError::PersistenceFailure)?;
        let outcome = apply_buy(unit.as_mut(), &request, price, settlement_time()).await;
        let plan = finish(unit, outcome).await?;

        info!(
            "SettlementEngine: BUY {} {} @ {} settled for student {} in class {} (balance {})",
            request.quantity,
            request.symbol,
            price,
            request.student_id,
            request.class_id,
            plan.new_balance
        );

        self.refreshed_view(request.student_id, plan.transaction.id)
            .await
    }

    async fn settle_sell(
        &self,
        student_id: StudentId,
        class_id: ClassId,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<LedgerView, SettlementError> {
        let request = TradeRequest::new(student_id, class_id, symbol, quantity)?;

        self.require_balance(&request).await?;
        let lots = self
            .ledger
            .lots(request.student_id, request.class_id, &request.symbol)
            .await
            .map_err(SettlementError::PersistenceFailure)?;
        check_holdings(&request.symbol, &lots, request.quantity)?;

        let price = self.fetch_price(&request.symbol).await?;

        let mut unit = self
            .ledger
            .begin()
            .await
            .map_err(SettlementError::PersistenceFailure)?;
        let outcome = apply_sell(unit.as_mut(), &request, price, settlement_time()).await;
        let plan = finish(unit, outcome).await?;

        info!(
            "SettlementEngine: SELL {} {} @ {} settled for student {} in class {} (balance {}, net profit/share {})",
            request.quantity,
            request.symbol,
            price,
            request.student_id,
            request.class_id,
            plan.new_balance,
            plan.net_profit.round_dp(4)
        );

        self.refreshed_view(request.student_id, plan.transaction.id)
            .await
    }

    async fn require_balance(&self, request: &TradeRequest) -> Result<Decimal, SettlementError> {
        self.ledger
            .balance(request.student_id, request.class_id)
            .await
            .map_err(SettlementError::PersistenceFailure)?
            .ok_or(SettlementError::NotFound {
                student_id: request.student_id,
                class_id: request.class_id,
            })
    }

    /// Live price, bounded by `quote_timeout`. Non-positive prices count as missing.
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, SettlementError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.quote_timeout, self.quotes.quote(symbol)).await
        {
            Ok(result) => result,
            Err(_) => Err(QuoteError::Timeout {
                duration_ms: self.quote_timeout.as_millis() as u64,
            }),
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_quote_latency("quote", started.elapsed().as_secs_f64());
        }

        let price = result
            .and_then(|price| {
                if price > Decimal::ZERO {
                    Ok(price)
                } else {
                    Err(QuoteError::MissingPrice {
                        symbol: symbol.to_string(),
                    })
                }
            })
            .map_err(|source| SettlementError::QuoteUnavailable {
                symbol: symbol.to_string(),
                source,
            })?;

        debug!("SettlementEngine: {} quoted at {}", symbol, price);
        Ok(price)
    }

    async fn refreshed_view(
        &self,
        student_id: StudentId,
        transaction_id: Uuid,
    ) -> Result<LedgerView, SettlementError> {
        self.ledger
            .ledger_view(student_id)
            .await
            .map_err(|source| SettlementError::LedgerViewUnavailable {
                transaction_id,
                source,
            })
    }

    fn record(&self, side: &str, result: &Result<LedgerView, SettlementError>) {
        match result {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_settled(side);
                }
            }
            Err(e) if e.is_settled() => {
                error!("SettlementEngine: {} settled but not reported: {:#}", side, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_settled(side);
                }
            }
            Err(e) => {
                match e {
                    SettlementError::PersistenceFailure(_) => {
                        error!("SettlementEngine: {} failed: {}", side, e)
                    }
                    _ => warn!("SettlementEngine: {} rejected: {}", side, e),
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejected(side, e.reason_code());
                }
            }
        }
    }
}

/// Millisecond precision, matching what the ledger store keeps
fn settlement_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Lock the enrollment, re-check funds and write a buy into `unit`.
///
/// Does not commit; the caller owns the unit of work.
pub async fn apply_buy(
    unit: &mut dyn LedgerUnitOfWork,
    request: &TradeRequest,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<BuyPlan, SettlementError> {
    let balance = lock_balance(unit, request).await?;
    let plan = plan_buy(request, balance, price, now)?;

    unit.set_balance(request.student_id, request.class_id, plan.new_balance)
        .await
        .map_err(SettlementError::PersistenceFailure)?;
    unit.insert_lot(&plan.lot)
        .await
        .map_err(SettlementError::PersistenceFailure)?;
    unit.append_transaction(&plan.transaction)
        .await
        .map_err(SettlementError::PersistenceFailure)?;

    Ok(plan)
}

/// Lock the enrollment, re-check holdings and write a FIFO sell into `unit`.
///
/// Does not commit; the caller owns the unit of work.
pub async fn apply_sell(
    unit: &mut dyn LedgerUnitOfWork,
    request: &TradeRequest,
    price: Decimal,
    now: DateTime<Utc>,
) -> Result<SellPlan, SettlementError> {
    let balance = lock_balance(unit, request).await?;
    let lots = unit
        .lots(request.student_id, request.class_id, &request.symbol)
        .await
        .map_err(SettlementError::PersistenceFailure)?;
    let plan = plan_sell(request, balance, &lots, price, now)?;

    unit.set_balance(request.student_id, request.class_id, plan.new_balance)
        .await
        .map_err(SettlementError::PersistenceFailure)?;
    for change in &plan.lot_changes {
        let written = match change {
            LotChange::Remove { lot_id } => unit.delete_lot(*lot_id).await,
            LotChange::Reduce { lot_id, remaining } => {
                unit.update_lot_quantity(*lot_id, *remaining).await
            }
        };
        written.map_err(SettlementError::PersistenceFailure)?;
    }
    unit.append_transaction(&plan.transaction)
        .await
        .map_err(SettlementError::PersistenceFailure)?;

    Ok(plan)
}

async fn lock_balance(
    unit: &mut dyn LedgerUnitOfWork,
    request: &TradeRequest,
) -> Result<Decimal, SettlementError> {
    unit.lock_balance(request.student_id, request.class_id)
        .await
        .map_err(SettlementError::PersistenceFailure)?
        .ok_or(SettlementError::NotFound {
            student_id: request.student_id,
            class_id: request.class_id,
        })
}

/// Commit on success, roll back on any error
async fn finish<T>(
    mut unit: Box<dyn LedgerUnitOfWork>,
    outcome: Result<T, SettlementError>,
) -> Result<T, SettlementError> {
    match outcome {
        Ok(value) => {
            unit.commit()
                .await
                .map_err(SettlementError::PersistenceFailure)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(
                    "SettlementEngine: rollback after '{}' failed: {:#}",
                    e, rollback_err
                );
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::DEFAULT_CLASS_BALANCE;
    use crate::infrastructure::mock::MockQuoteGateway;
    use crate::infrastructure::persistence::{Database, SqliteLedgerRepository};
    use rust_decimal_macros::dec;

    struct Harness {
        engine: SettlementEngine,
        ledger: Arc<SqliteLedgerRepository>,
        quotes: MockQuoteGateway,
        metrics: Metrics,
        student: StudentId,
        class: ClassId,
    }

    async fn harness(opening_balance: Decimal) -> Harness {
        let db = Database::in_memory().await.unwrap();
        let ledger = Arc::new(SqliteLedgerRepository::new(db.pool.clone()));
        let quotes = MockQuoteGateway::new();
        let metrics = Metrics::new().unwrap();

        let class = ledger
            .create_class("Period 3", opening_balance)
            .await
            .unwrap()
            .id;
        let student = Uuid::new_v4();
        ledger.enroll(student, class).await.unwrap();

        let engine = SettlementEngine::new(
            ledger.clone(),
            Arc::new(quotes.clone()),
            Duration::from_millis(200),
        )
        .with_metrics(metrics.clone());

        Harness {
            engine,
            ledger,
            quotes,
            metrics,
            student,
            class,
        }
    }

    #[tokio::test]
    async fn test_buy_then_sell_round_trip() {
        let h = harness(dec!(1000)).await;
        h.quotes.set_price("XYZ", dec!(50.00)).await;

        let view = h.engine.buy(h.student, h.class, "xyz", dec!(10)).await.unwrap();
        let class = view.class(h.class).unwrap();
        assert_eq!(class.balance, dec!(500.00));
        assert_eq!(class.held_quantity("XYZ"), dec!(10));
        assert_eq!(class.transactions.len(), 1);
        assert_eq!(class.transactions[0].balance_after, dec!(500.00));
        assert_eq!(class.transactions[0].net_profit, None);

        h.quotes.set_price("XYZ", dec!(60)).await;
        let view = h.engine.sell(h.student, h.class, "XYZ", dec!(10)).await.unwrap();
        let class = view.class(h.class).unwrap();
        assert_eq!(class.balance, dec!(1100.00));
        assert!(class.position("XYZ").is_none());
        assert_eq!(class.transactions[1].net_profit, Some(dec!(10)));
        assert_eq!(h.metrics.trades_with_outcome("settled"), 2);
    }

    #[tokio::test]
    async fn test_not_enrolled_is_not_found() {
        let h = harness(DEFAULT_CLASS_BALANCE).await;
        h.quotes.set_price("XYZ", dec!(1)).await;

        let err = h
            .engine
            .buy(Uuid::new_v4(), h.class, "XYZ", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { .. }));
        // Rejected before any quote is requested
        assert_eq!(h.quotes.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_sell_without_holdings_skips_quote() {
        let h = harness(DEFAULT_CLASS_BALANCE).await;

        let err = h
            .engine
            .sell(h.student, h.class, "ABC", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientHoldings { .. }));
        assert_eq!(h.quotes.quote_calls(), 0);
        assert_eq!(
            h.ledger.balance(h.student, h.class).await.unwrap(),
            Some(DEFAULT_CLASS_BALANCE)
        );
        assert_eq!(h.metrics.trades_with_outcome("rejected"), 1);
    }

    #[tokio::test]
    async fn test_zero_price_is_quote_unavailable() {
        let h = harness(DEFAULT_CLASS_BALANCE).await;
        h.quotes.set_price("NOPE", Decimal::ZERO).await;

        let err = h
            .engine
            .buy(h.student, h.class, "NOPE", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::QuoteUnavailable {
                source: QuoteError::MissingPrice { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_slow_quote_times_out() {
        let h = harness(DEFAULT_CLASS_BALANCE).await;
        h.quotes.set_price("SLOW", dec!(10)).await;
        h.quotes.set_delay(Duration::from_secs(5)).await;

        let err = h
            .engine
            .buy(h.student, h.class, "SLOW", dec!(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::QuoteUnavailable {
                source: QuoteError::Timeout { duration_ms: 200 },
                ..
            }
        ));
        assert_eq!(err.status_code(), 503);
    }
}
