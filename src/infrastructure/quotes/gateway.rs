use super::{FinnhubClient, FmpClient};
use crate::config::QuoteEnvConfig;
use crate::domain::errors::QuoteError;
use crate::domain::ports::{BulkQuote, Candle, QuoteGateway, SymbolInfo};
use crate::infrastructure::core::HttpClientFactory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// `QuoteGateway` backed by Finnhub (single quotes, candles) and FMP (bulk)
pub struct HttpQuoteGateway {
    finnhub: FinnhubClient,
    fmp: FmpClient,
}

impl HttpQuoteGateway {
    pub fn new(finnhub: FinnhubClient, fmp: FmpClient) -> Self {
        Self { finnhub, fmp }
    }

    pub fn from_config(config: &QuoteEnvConfig) -> Self {
        let quote_client =
            HttpClientFactory::create_client(config.quote_timeout, config.max_retries);
        let bulk_client =
            HttpClientFactory::create_client(config.bulk_quote_timeout, config.max_retries);

        Self::new(
            FinnhubClient::new(
                quote_client,
                config.finnhub_base_url.clone(),
                config.finnhub_api_key.clone(),
                config.quote_timeout,
            ),
            FmpClient::new(
                bulk_client,
                config.fmp_base_url.clone(),
                config.fmp_api_key.clone(),
                config.bulk_quote_timeout,
            ),
        )
    }
}

#[async_trait]
impl QuoteGateway for HttpQuoteGateway {
    async fn quote(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        self.finnhub.quote(symbol).await
    }

    async fn bulk_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, BulkQuote>, QuoteError> {
        self.fmp.bulk_quotes(symbols).await
    }

    async fn candles(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, QuoteError> {
        self.finnhub.candles(symbol, from, to).await
    }

    async fn symbols(&self, exchange: &str) -> Result<Vec<SymbolInfo>, QuoteError> {
        self.finnhub.symbols(exchange).await
    }
}
