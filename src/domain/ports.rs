use crate::domain::errors::QuoteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry of a bulk quote response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkQuote {
    pub symbol: String,
    pub price: Decimal,
    pub name: Option<String>,
    pub change_percent: Option<Decimal>,
    pub day_low: Option<Decimal>,
    pub day_high: Option<Decimal>,
    pub volume: Option<u64>,
}

impl BulkQuote {
    pub fn new(symbol: &str, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            name: None,
            change_percent: None,
            day_low: None,
            day_high: None,
            volume: None,
        }
    }
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// One listing of an exchange's symbol directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub display_symbol: String,
    pub description: String,
    /// Security type as the provider labels it ("Common Stock", "ETP", ...)
    pub kind: String,
    pub currency: Option<String>,
}

/// Upstream market data. Implementations are stateless; concurrent calls are independent.
#[async_trait]
pub trait QuoteGateway: Send + Sync {
    /// Current price of one symbol
    async fn quote(&self, symbol: &str) -> Result<Decimal, QuoteError>;

    /// Quotes for many symbols in one upstream call. Symbols the provider
    /// does not know are simply absent from the map.
    async fn bulk_quotes(&self, symbols: &[String]) -> Result<HashMap<String, BulkQuote>, QuoteError>;

    /// Daily candles between `from` and `to`
    async fn candles(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, QuoteError>;

    /// Every symbol listed on `exchange` (e.g. "US")
    async fn symbols(&self, exchange: &str) -> Result<Vec<SymbolInfo>, QuoteError>;
}
