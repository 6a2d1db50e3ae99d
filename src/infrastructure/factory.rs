use crate::config::{QuoteEnvConfig, QuoteProvider};
use crate::domain::ports::QuoteGateway;
use crate::infrastructure::mock::MockQuoteGateway;
use crate::infrastructure::quotes::HttpQuoteGateway;
use std::sync::Arc;
use tracing::{info, warn};

pub struct QuoteGatewayFactory;

impl QuoteGatewayFactory {
    pub fn create(config: &QuoteEnvConfig) -> Arc<dyn QuoteGateway> {
        match config.provider {
            QuoteProvider::Http => {
                if config.finnhub_api_key.is_empty() {
                    warn!("FINNHUB_API_KEY is not set; single quotes will be rejected upstream");
                }
                if config.fmp_api_key.is_empty() {
                    warn!("FMP_API_KEY is not set; bulk quotes will be rejected upstream");
                }
                info!(
                    "Quote provider: HTTP (Finnhub {}, FMP {})",
                    config.finnhub_base_url, config.fmp_base_url
                );
                Arc::new(HttpQuoteGateway::from_config(config))
            }
            QuoteProvider::Mock => {
                info!("Quote provider: Mock (no upstream calls)");
                Arc::new(MockQuoteGateway::new())
            }
        }
    }
}
