//! Market data provider configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which quote gateway the services are wired with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteProvider {
    Http,
    Mock,
}

impl FromStr for QuoteProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(QuoteProvider::Http),
            "mock" => Ok(QuoteProvider::Mock),
            _ => anyhow::bail!("Invalid QUOTE_PROVIDER: {}. Must be 'http' or 'mock'", s),
        }
    }
}

/// Quote provider environment configuration
#[derive(Debug, Clone)]
pub struct QuoteEnvConfig {
    pub provider: QuoteProvider,
    pub finnhub_api_key: String,
    pub finnhub_base_url: String,
    pub fmp_api_key: String,
    pub fmp_base_url: String,
    pub quote_timeout: Duration,
    pub bulk_quote_timeout: Duration,
    pub max_retries: u32,
}

impl Default for QuoteEnvConfig {
    fn default() -> Self {
        Self {
            provider: QuoteProvider::Http,
            finnhub_api_key: String::new(),
            finnhub_base_url: "https://finnhub.io/api/v1".to_string(),
            fmp_api_key: String::new(),
            fmp_base_url: "https://financialmodelingprep.com/api/v3".to_string(),
            quote_timeout: Duration::from_millis(5000),
            bulk_quote_timeout: Duration::from_millis(15000),
            max_retries: 2,
        }
    }
}

impl QuoteEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let provider_str = env::var("QUOTE_PROVIDER").unwrap_or_else(|_| "http".to_string());

        Ok(Self {
            provider: QuoteProvider::from_str(&provider_str)?,
            finnhub_api_key: env::var("FINNHUB_API_KEY").unwrap_or_default(),
            finnhub_base_url: env::var("FINNHUB_BASE_URL")
                .unwrap_or(defaults.finnhub_base_url)
                .trim_end_matches('/')
                .to_string(),
            fmp_api_key: env::var("FMP_API_KEY").unwrap_or_default(),
            fmp_base_url: env::var("FMP_BASE_URL")
                .unwrap_or(defaults.fmp_base_url)
                .trim_end_matches('/')
                .to_string(),
            quote_timeout: Duration::from_millis(Self::parse_u64("QUOTE_TIMEOUT_MS", 5000)?),
            bulk_quote_timeout: Duration::from_millis(Self::parse_u64(
                "BULK_QUOTE_TIMEOUT_MS",
                15000,
            )?),
            max_retries: Self::parse_u32("QUOTE_MAX_RETRIES", defaults.max_retries)?,
        })
    }

    fn parse_u64(key: &str, default: u64) -> Result<u64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u64>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_u32(key: &str, default: u32) -> Result<u32> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<u32>()
            .context(format!("Failed to parse {}", key))
    }
}
