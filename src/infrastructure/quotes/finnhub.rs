use super::{check_status, map_send_error, price_from_f64};
use crate::domain::errors::QuoteError;
use crate::domain::ports::{Candle, SymbolInfo};
use crate::infrastructure::core::http_client_factory::build_url_with_query;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    /// Current price. Finnhub answers 0 for symbols it does not know.
    c: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubCandles {
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubSymbol {
    symbol: String,
    #[serde(default)]
    display_symbol: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    kind: String,
    currency: Option<String>,
}

/// Finnhub REST client for single quotes, daily candles and the symbol directory
pub struct FinnhubClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl FinnhubClient {
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

    pub async fn quote(&self, symbol: &str) -> Result<Decimal, QuoteError> {
        let url = build_url_with_query(
            &format!("{}/quote", self.base_url),
            &[("symbol", symbol), ("token", self.api_key.as_str())],
        );

        let body = self.get(&url).await?;
        let price = parse_quote(symbol, &body)?;
        debug!("Finnhub: {} quoted at {}", symbol, price);
        Ok(price)
    }

    pub async fn candles(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, QuoteError> {
        let from_str = from.timestamp().to_string();
        let to_str = to.timestamp().to_string();
        let url = build_url_with_query(
            &format!("{}/stock/candle", self.base_url),
            &[
                ("symbol", symbol),
                ("resolution", "D"),
                ("from", from_str.as_str()),
                ("to", to_str.as_str()),
                ("token", self.api_key.as_str()),
            ],
        );

        let body = self.get(&url).await?;
        parse_candles(symbol, &body)
    }

    pub async fn symbols(&self, exchange: &str) -> Result<Vec<SymbolInfo>, QuoteError> {
        let url = build_url_with_query(
            &format!("{}/stock/symbol", self.base_url),
            &[("exchange", exchange), ("token", self.api_key.as_str())],
        );

        let body = self.get(&url).await?;
        let symbols = parse_symbols(&body)?;
        debug!("Finnhub: {} symbols listed on {}", symbols.len(), exchange);
        Ok(symbols)
    }

    async fn get(&self, url: &str) -> Result<String, QuoteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        let status = response.status();
        if let Err(e) = check_status(status) {
            warn!("Finnhub: request failed with HTTP {}", status);
            return Err(e);
        }

        response
            .text()
            .await
            .map_err(|e| QuoteError::Transport(e.to_string()))
    }
}

fn parse_quote(symbol: &str, body: &str) -> Result<Decimal, QuoteError> {
    let quote: FinnhubQuote =
        serde_json::from_str(body).map_err(|e| QuoteError::Decode(e.to_string()))?;

    price_from_f64(quote.c).ok_or_else(|| QuoteError::MissingPrice {
        symbol: symbol.to_string(),
    })
}

fn parse_candles(symbol: &str, body: &str) -> Result<Vec<Candle>, QuoteError> {
    let candles: FinnhubCandles =
        serde_json::from_str(body).map_err(|e| QuoteError::Decode(e.to_string()))?;

    match candles.s.as_str() {
        "no_data" => return Ok(Vec::new()),
        "ok" => {}
        other => {
            return Err(QuoteError::Decode(format!(
                "Unexpected candle status for {}: {}",
                symbol, other
            )));
        }
    }

    let len = candles.t.len();
    if [
        candles.o.len(),
        candles.h.len(),
        candles.l.len(),
        candles.c.len(),
        candles.v.len(),
    ]
    .iter()
    .any(|n| *n != len)
    {
        return Err(QuoteError::Decode(format!(
            "Candle arrays for {} have mismatched lengths",
            symbol
        )));
    }

    let decimal = |v: f64| {
        Decimal::from_f64(v)
            .ok_or_else(|| QuoteError::Decode(format!("Non-finite candle value for {}", symbol)))
    };

    let mut bars = Vec::with_capacity(len);
    for i in 0..len {
        let timestamp = DateTime::from_timestamp(candles.t[i], 0).ok_or_else(|| {
            QuoteError::Decode(format!("Candle timestamp out of range: {}", candles.t[i]))
        })?;
        bars.push(Candle {
            timestamp,
            open: decimal(candles.o[i])?,
            high: decimal(candles.h[i])?,
            low: decimal(candles.l[i])?,
            close: decimal(candles.c[i])?,
            volume: decimal(candles.v[i])?,
        });
    }
    Ok(bars)
}

/// Directory entries sorted by symbol. Entries without a symbol are dropped.
fn parse_symbols(body: &str) -> Result<Vec<SymbolInfo>, QuoteError> {
    let listed: Vec<FinnhubSymbol> =
        serde_json::from_str(body).map_err(|e| QuoteError::Decode(e.to_string()))?;

    let mut symbols: Vec<SymbolInfo> = listed
        .into_iter()
        .filter(|s| !s.symbol.trim().is_empty())
        .map(|s| SymbolInfo {
            display_symbol: if s.display_symbol.is_empty() {
                s.symbol.clone()
            } else {
                s.display_symbol
            },
            symbol: s.symbol,
            description: s.description,
            kind: s.kind,
            currency: s.currency.filter(|c| !c.is_empty()),
        })
        .collect();
    symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_quote() {
        let body = r#"{"c":187.44,"d":1.2,"dp":0.64,"h":188.0,"l":185.1,"o":186.0,"pc":186.24,"t":1700000000}"#;
        assert_eq!(parse_quote("AAPL", body).unwrap(), dec!(187.44));
    }

    #[test]
    fn test_unknown_symbol_has_no_price() {
        let body = r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#;
        assert!(matches!(
            parse_quote("NOPE", body),
            Err(QuoteError::MissingPrice { .. })
        ));
    }

    #[test]
    fn test_garbage_quote_is_decode_error() {
        assert!(matches!(
            parse_quote("AAPL", "<html>rate limited</html>"),
            Err(QuoteError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_candles() {
        let body = r#"{"s":"ok","t":[1700000000,1700086400],"o":[10.0,11.0],"h":[12.0,12.5],"l":[9.5,10.5],"c":[11.0,12.0],"v":[1000,2000]}"#;
        let bars = parse_candles("XYZ", body).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, dec!(12));
        assert_eq!(bars[0].volume, dec!(1000));
    }

    #[test]
    fn test_no_data_candles_are_empty() {
        assert!(parse_candles("XYZ", r#"{"s":"no_data"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_candles_rejected() {
        let body = r#"{"s":"ok","t":[1],"o":[1.0,2.0],"h":[1.0],"l":[1.0],"c":[1.0],"v":[1]}"#;
        assert!(matches!(
            parse_candles("XYZ", body),
            Err(QuoteError::Decode(_))
        ));
    }

    #[test]
    fn test_parse_symbols() {
        let body = r#"[
            {"currency":"USD","description":"MICROSOFT CORP","displaySymbol":"MSFT","figi":"BBG000BPH459","mic":"XNAS","symbol":"MSFT","type":"Common Stock"},
            {"currency":"","description":"APPLE INC","displaySymbol":"","figi":"BBG000B9XRY4","mic":"XNAS","symbol":"AAPL","type":"Common Stock"},
            {"currency":"USD","description":"BROKEN","displaySymbol":"","symbol":"","type":""}
        ]"#;

        let symbols = parse_symbols(body).unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].symbol, "AAPL");
        assert_eq!(symbols[0].display_symbol, "AAPL");
        assert_eq!(symbols[0].currency, None);
        assert_eq!(symbols[1].description, "MICROSOFT CORP");
        assert_eq!(symbols[1].kind, "Common Stock");
        assert_eq!(symbols[1].currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_symbol_error_object_is_decode_error() {
        assert!(matches!(
            parse_symbols(r#"{"error":"Invalid API key"}"#),
            Err(QuoteError::Decode(_))
        ));
    }
}
