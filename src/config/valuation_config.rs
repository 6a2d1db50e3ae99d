//! Daily portfolio valuation schedule configuration.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::env;

/// Valuation scheduler environment configuration
#[derive(Debug, Clone)]
pub struct ValuationEnvConfig {
    pub enabled: bool,
    pub timezone: Tz,
    /// Local hour (0-23) in `timezone` at which the daily run fires
    pub hour: u32,
}

impl Default for ValuationEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: chrono_tz::America::New_York,
            hour: 0,
        }
    }
}

impl ValuationEnvConfig {
    pub fn from_env() -> Result<Self> {
        let timezone_str =
            env::var("VALUATION_TIMEZONE").unwrap_or_else(|_| "America/New_York".to_string());
        let hour_str = env::var("VALUATION_HOUR").unwrap_or_else(|_| "0".to_string());

        Ok(Self {
            enabled: env::var("VALUATION_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            timezone: parse_timezone(&timezone_str)?,
            hour: parse_hour(&hour_str)?,
        })
    }
}

pub(crate) fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("Invalid VALUATION_TIMEZONE {}: {}", raw, e))
}

pub(crate) fn parse_hour(raw: &str) -> Result<u32> {
    let hour = raw
        .trim()
        .parse::<u32>()
        .context("Failed to parse VALUATION_HOUR")?;
    if hour > 23 {
        anyhow::bail!("VALUATION_HOUR must be between 0 and 23, got {}", hour);
    }
    Ok(hour)
}
