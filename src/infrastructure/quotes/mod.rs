//! Upstream market data over HTTP.
//!
//! Single quotes and candles come from Finnhub, bulk quotes from
//! Financial Modeling Prep. `HttpQuoteGateway` puts both behind the
//! `QuoteGateway` port.

mod finnhub;
mod fmp;
mod gateway;

pub use finnhub::FinnhubClient;
pub use fmp::FmpClient;
pub use gateway::HttpQuoteGateway;

use crate::domain::errors::QuoteError;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::time::Duration;

fn map_send_error(err: reqwest_middleware::Error, timeout: Duration) -> QuoteError {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => QuoteError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        },
        other => QuoteError::Transport(other.to_string()),
    }
}

fn check_status(status: StatusCode) -> Result<(), QuoteError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(QuoteError::Http {
            status: status.as_u16(),
        })
    }
}

/// Positive finite price as a decimal
fn price_from_f64(value: Option<f64>) -> Option<Decimal> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .and_then(Decimal::from_f64)
}
