use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub mod shutdown_service;

use crate::application::bootstrap::{
    persistence::{PersistenceBootstrap, PersistenceHandle},
    services::{ServicesBootstrap, ServicesHandle},
};
use crate::application::settlement::SettlementEngine;
use crate::application::system::shutdown_service::ShutdownService;
use crate::application::valuation::{
    DailySchedule, PortfolioValuationJob, ValuationReport, ValuationScheduler,
};
use crate::config::Config;
use crate::domain::ports::QuoteGateway;
use crate::infrastructure::observability::{Metrics, MetricsReporter};

/// Running background tasks plus the services callers trade through
pub struct SystemHandle {
    pub settlement_engine: Arc<SettlementEngine>,
    pub valuation_job: Arc<PortfolioValuationJob>,
    pub metrics: Metrics,
    shutdown_service: ShutdownService,
}

impl SystemHandle {
    /// Stop the scheduler and reporter, letting an in-flight valuation finish
    pub async fn shutdown(self) {
        self.shutdown_service.shutdown().await;
    }
}

pub struct Application {
    pub config: Config,
    pub persistence: PersistenceHandle,
    pub services: ServicesHandle,
    pub metrics: Metrics,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        info!(
            "Building StockSim Application (quotes: {:?})...",
            config.quote.provider
        );

        let metrics = Metrics::new()?;
        let persistence = PersistenceBootstrap::init(&config.database_url).await?;
        let services = ServicesBootstrap::init(&config, &persistence, metrics.clone());

        Ok(Self {
            config,
            persistence,
            services,
            metrics,
        })
    }

    /// Assemble around an opened ledger and a caller-supplied quote gateway
    pub fn with_parts(
        config: Config,
        persistence: PersistenceHandle,
        quote_gateway: Arc<dyn QuoteGateway>,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        let services =
            ServicesBootstrap::with_gateway(&config, &persistence, quote_gateway, metrics.clone());

        Ok(Self {
            config,
            persistence,
            services,
            metrics,
        })
    }

    pub fn settlement_engine(&self) -> Arc<SettlementEngine> {
        self.services.settlement_engine.clone()
    }

    /// Run the valuation job immediately, outside the schedule
    pub async fn run_valuation_once(&self) -> Result<ValuationReport> {
        self.services.valuation_job.run().await
    }

    pub fn start(self) -> SystemHandle {
        let mut shutdown_service = ShutdownService::new();

        if self.config.valuation.enabled {
            let schedule =
                DailySchedule::new(self.config.valuation.timezone, self.config.valuation.hour);
            let scheduler = ValuationScheduler::new(self.services.valuation_job.clone(), schedule);
            info!(
                "Starting ValuationScheduler ({} at {:02}:00)...",
                self.config.valuation.timezone, self.config.valuation.hour
            );
            let shutdown_rx = shutdown_service.subscribe();
            shutdown_service.track("ValuationScheduler", tokio::spawn(scheduler.run(shutdown_rx)));
        } else {
            info!("ValuationScheduler disabled (VALUATION_ENABLED=false)");
        }

        if self.config.observability.enabled {
            let reporter =
                MetricsReporter::new(self.metrics.clone(), self.config.observability.interval_secs);
            let shutdown_rx = shutdown_service.subscribe();
            shutdown_service.track("MetricsReporter", tokio::spawn(reporter.run(shutdown_rx)));
        }

        SystemHandle {
            settlement_engine: self.services.settlement_engine.clone(),
            valuation_job: self.services.valuation_job.clone(),
            metrics: self.metrics,
            shutdown_service,
        }
    }
}
