use super::{check_status, map_send_error, price_from_f64};
use crate::domain::errors::QuoteError;
use crate::domain::ledger::normalize_symbol;
use crate::domain::ports::BulkQuote;
use crate::infrastructure::core::http_client_factory::{build_url_with_query, urlencoding_encode};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    symbol: String,
    name: Option<String>,
    price: Option<f64>,
    changes_percentage: Option<f64>,
    day_low: Option<f64>,
    day_high: Option<f64>,
    volume: Option<f64>,
}

/// Financial Modeling Prep client for multi-symbol quotes
pub struct FmpClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl FmpClient {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: String,
        api_key: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            timeout,
        }
    }

    /// One request for every symbol: `GET {base}/quote/A,B,C?apikey=...`
    pub async fn bulk_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, BulkQuote>, QuoteError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let path = symbols
            .iter()
            .map(|s| urlencoding_encode(s))
            .collect::<Vec<_>>()
            .join(",");
        let url = build_url_with_query(
            &format!("{}/quote/{}", self.base_url, path),
            &[("apikey", self.api_key.as_str())],
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status();
        if let Err(e) = check_status(status) {
            warn!(
                "FMP: bulk quote for {} symbols failed with HTTP {}",
                symbols.len(),
                status
            );
            return Err(e);
        }

        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Transport(e.to_string()))?;

        let quotes = parse_bulk(&body)?;
        debug!(
            "FMP: {} of {} symbols quoted",
            quotes.len(),
            symbols.len()
        );
        Ok(quotes)
    }
}

fn parse_bulk(body: &str) -> Result<HashMap<String, BulkQuote>, QuoteError> {
    let entries: Vec<FmpQuote> =
        serde_json::from_str(body).map_err(|e| QuoteError::Decode(e.to_string()))?;

    let mut quotes = HashMap::with_capacity(entries.len());
    for entry in entries {
        // Entries without a usable price count as not quoted
        let Some(price) = price_from_f64(entry.price) else {
            continue;
        };
        let symbol = normalize_symbol(&entry.symbol);
        quotes.insert(
            symbol.clone(),
            BulkQuote {
                symbol,
                price,
                name: entry.name,
                change_percent: entry.changes_percentage.and_then(Decimal::from_f64),
                day_low: entry.day_low.and_then(Decimal::from_f64),
                day_high: entry.day_high.and_then(Decimal::from_f64),
                volume: entry
                    .volume
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v as u64),
            },
        );
    }
    Ok(quotes)
}
