use crate::domain::errors::QuoteError;
use crate::domain::ports::{BulkQuote, Candle, QuoteGateway, SymbolInfo};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    failing_symbols: HashSet<String>,
    failing_bulk: HashSet<String>,
    delay: Option<Duration>,
    bulk_requests: Vec<Vec<String>>,
}

/// In-process quote gateway with scripted prices, failures and latency.
///
/// Clones share state, so a test can keep one handle and give another to the
/// service under test.
#[derive(Clone, Default)]
pub struct MockQuoteGateway {
    state: Arc<RwLock<MockState>>,
    quote_calls: Arc<AtomicUsize>,
    bulk_calls: Arc<AtomicUsize>,
}

impl MockQuoteGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);
    }

    pub async fn remove_price(&self, symbol: &str) {
        self.state.write().await.prices.remove(symbol);
    }

    /// Make single quotes for `symbol` fail with an HTTP 503
    pub async fn fail_symbol(&self, symbol: &str) {
        self.state
            .write()
            .await
            .failing_symbols
            .insert(symbol.to_string());
    }

    /// Make any bulk request that includes `symbol` fail with an HTTP 503
    pub async fn fail_bulk_containing(&self, symbol: &str) {
        self.state
            .write()
            .await
            .failing_bulk
            .insert(symbol.to_string());
    }

    /// Sleep this long before answering any call
    pub async fn set_delay(&self, delay: Duration) {
        self.state.write().await.delay = Some(delay);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Symbol lists of every bulk request, in call order
    pub async fn bulk_requests(&self) -> Vec<Vec<String>> {
        self.state.read().await.bulk_requests.clone()
    }

    async fn pause(&self) {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl QuoteGateway for MockQuoteGateway {
    async fn quote(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let state = self.state.read().await;
        if state.failing_symbols.contains(symbol) {
            return Err(QuoteError::Http { status: 503 });
        }
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| QuoteError::MissingPrice {
                symbol: symbol.to_string(),
            })
    }

    async fn bulk_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, BulkQuote>, QuoteError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .write()
            .await
            .bulk_requests
            .push(symbols.to_vec());
        self.pause().await;

        let state = self.state.read().await;
        if symbols.iter().any(|s| state.failing_bulk.contains(s)) {
            return Err(QuoteError::Http { status: 503 });
        }

        let quotes: HashMap<String, BulkQuote> = symbols
            .iter()
            .filter_map(|symbol| {
                state
                    .prices
                    .get(symbol)
                    .map(|price| (symbol.clone(), BulkQuote::new(symbol, *price)))
            })
            .collect();

        debug!(
            "MockQuoteGateway: bulk quoted {}/{} symbols",
            quotes.len(),
            symbols.len()
        );
        Ok(quotes)
    }

    async fn candles(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, QuoteError> {
        self.pause().await;

        let state = self.state.read().await;
        let Some(price) = state.prices.get(symbol).copied() else {
            return Ok(Vec::new());
        };

        // Flat daily bars at the current price
        let mut bars = Vec::new();
        let mut day = from;
        while day <= to {
            bars.push(Candle {
                timestamp: day,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: Decimal::ZERO,
            });
            day += ChronoDuration::days(1);
        }
        Ok(bars)
    }

    /// Every priced symbol, whatever the exchange
    async fn symbols(&self, _exchange: &str) -> Result<Vec<SymbolInfo>, QuoteError> {
        self.pause().await;

        let state = self.state.read().await;
        let mut symbols: Vec<SymbolInfo> = state
            .prices
            .keys()
            .map(|symbol| SymbolInfo {
                symbol: symbol.clone(),
                display_symbol: symbol.clone(),
                description: String::new(),
                kind: "Common Stock".to_string(),
                currency: Some("USD".to_string()),
            })
            .collect();
        symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(symbols)
    }
}
