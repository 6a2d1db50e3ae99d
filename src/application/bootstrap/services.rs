use std::sync::Arc;

use crate::application::bootstrap::persistence::PersistenceHandle;
use crate::application::settlement::SettlementEngine;
use crate::application::valuation::PortfolioValuationJob;
use crate::config::Config;
use crate::domain::ports::QuoteGateway;
use crate::infrastructure::factory::QuoteGatewayFactory;
use crate::infrastructure::observability::Metrics;

pub struct ServicesHandle {
    pub quote_gateway: Arc<dyn QuoteGateway>,
    pub settlement_engine: Arc<SettlementEngine>,
    pub valuation_job: Arc<PortfolioValuationJob>,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub fn init(config: &Config, persistence: &PersistenceHandle, metrics: Metrics) -> ServicesHandle {
        let quote_gateway = QuoteGatewayFactory::create(&config.quote);
        Self::with_gateway(config, persistence, quote_gateway, metrics)
    }

    /// Same wiring around a caller-supplied gateway
    pub fn with_gateway(
        config: &Config,
        persistence: &PersistenceHandle,
        quote_gateway: Arc<dyn QuoteGateway>,
        metrics: Metrics,
    ) -> ServicesHandle {
        let settlement_engine = Arc::new(
            SettlementEngine::new(
                persistence.ledger_repository.clone(),
                quote_gateway.clone(),
                config.quote.quote_timeout,
            )
            .with_metrics(metrics.clone()),
        );

        let valuation_job = Arc::new(
            PortfolioValuationJob::new(
                persistence.ledger_repository.clone(),
                persistence.snapshot_repository.clone(),
                quote_gateway.clone(),
                config.quote.bulk_quote_timeout,
            )
            .with_metrics(metrics),
        );

        ServicesHandle {
            quote_gateway,
            settlement_engine,
            valuation_job,
        }
    }
}
