//! Configuration module for StockSim.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Storage, Quotes, Valuation, and Observability.

mod observability_config;
mod quote_config;
mod valuation_config;

pub use observability_config::ObservabilityEnvConfig;
pub use quote_config::{QuoteEnvConfig, QuoteProvider};
pub use valuation_config::ValuationEnvConfig;

use anyhow::{Context, Result};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub quote: QuoteEnvConfig,
    pub valuation: ValuationEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults; set but malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://stocksim.db".to_string());

        let quote = QuoteEnvConfig::from_env().context("Failed to load quote config")?;
        let valuation =
            ValuationEnvConfig::from_env().context("Failed to load valuation config")?;
        let observability =
            ObservabilityEnvConfig::from_env().context("Failed to load observability config")?;

        Ok(Self {
            database_url,
            quote,
            valuation,
            observability,
        })
    }

    /// Offline configuration with mock quotes and no background tasks.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            quote: QuoteEnvConfig {
                provider: QuoteProvider::Mock,
                ..QuoteEnvConfig::default()
            },
            valuation: ValuationEnvConfig {
                enabled: false,
                ..ValuationEnvConfig::default()
            },
            observability: ObservabilityEnvConfig {
                enabled: false,
                ..ObservabilityEnvConfig::default()
            },
        }
    }
}
