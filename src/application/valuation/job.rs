//! Portfolio Valuation Job
//!
//! Revalues every enrollment that holds a position, one class at a time,
//! with a single bulk quote request per class. A class whose bulk request
//! fails, times out or whose snapshots cannot be written is logged and
//! skipped; the other classes still get their snapshots.

use crate::domain::errors::QuoteError;
use crate::domain::ledger::ClassId;
use crate::domain::ports::QuoteGateway;
use crate::domain::repositories::{LedgerRepository, SnapshotRepository};
use crate::domain::valuation::{
    EnrollmentHoldings, PortfolioSnapshot, distinct_symbols, value_holdings,
};
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A class skipped by a run
#[derive(Debug, Clone, Serialize)]
pub struct ClassFailure {
    pub class_id: ClassId,
    pub reason: String,
}

/// Outcome of one valuation run
#[derive(Debug, Clone, Serialize)]
pub struct ValuationReport {
    pub run_at: DateTime<Utc>,
    pub classes_valued: usize,
    pub snapshots_written: usize,
    pub failed_classes: Vec<ClassFailure>,
}

impl ValuationReport {
    pub fn status(&self) -> &'static str {
        if self.failed_classes.is_empty() {
            "completed"
        } else {
            "partial"
        }
    }
}

pub struct PortfolioValuationJob {
    ledger: Arc<dyn LedgerRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    quotes: Arc<dyn QuoteGateway>,
    bulk_timeout: Duration,
    metrics: Option<Metrics>,
}

impl PortfolioValuationJob {
    pub fn new(
        ledger: Arc<dyn LedgerRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        quotes: Arc<dyn QuoteGateway>,
        bulk_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            snapshots,
            quotes,
            bulk_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run once. Only a failure to read the ledger aborts the whole run.
    pub async fn run(&self) -> Result<ValuationReport> {
        let run_at = Utc::now().trunc_subsecs(3);
        info!("PortfolioValuationJob: Starting run at {}", run_at);

        let by_class = match self.ledger.holdings_by_class().await {
            Ok(by_class) => by_class,
            Err(e) => {
                error!("PortfolioValuationJob: Failed to load holdings: {:#}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_valuation_run("failed", 0, 0);
                }
                return Err(e.context("Failed to load holdings for valuation"));
            }
        };

        let mut report = ValuationReport {
            run_at,
            classes_valued: 0,
            snapshots_written: 0,
            failed_classes: Vec::new(),
        };

        for (class_id, enrollments) in by_class {
            let holders: Vec<EnrollmentHoldings> = enrollments
                .into_iter()
                .filter(EnrollmentHoldings::has_positions)
                .collect();
            if holders.is_empty() {
                continue;
            }

            match self.value_class(class_id, &holders, run_at).await {
                Ok(written) => {
                    report.classes_valued += 1;
                    report.snapshots_written += written;
                }
                Err(e) => {
                    warn!(
                        "PortfolioValuationJob: Skipping class {}: {:#}",
                        class_id, e
                    );
                    report.failed_classes.push(ClassFailure {
                        class_id,
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_valuation_run(
                report.status(),
                report.snapshots_written,
                report.failed_classes.len(),
            );
        }

        info!(
            "PortfolioValuationJob: Run {} - {} classes valued, {} snapshots, {} classes skipped",
            report.status(),
            report.classes_valued,
            report.snapshots_written,
            report.failed_classes.len()
        );
        Ok(report)
    }

    async fn value_class(
        &self,
        class_id: ClassId,
        holders: &[EnrollmentHoldings],
        run_at: DateTime<Utc>,
    ) -> Result<usize> {
        let symbols = distinct_symbols(holders);

        let started = Instant::now();
        let quotes = match tokio::time::timeout(self.bulk_timeout, self.quotes.bulk_quotes(&symbols))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(QuoteError::Timeout {
                duration_ms: self.bulk_timeout.as_millis() as u64,
            }),
        };
        if let Some(metrics) = &self.metrics {
            metrics.observe_quote_latency("bulk", started.elapsed().as_secs_f64());
        }
        let quotes = quotes.with_context(|| {
            format!("Bulk quote for {} symbols failed", symbols.len())
        })?;

        let missing: Vec<&String> = symbols.iter().filter(|s| !quotes.contains_key(*s)).collect();
        if !missing.is_empty() {
            // Missing quotes value the holding at zero
            warn!(
                "PortfolioValuationJob: No quote for {:?} in class {}, valuing at 0",
                missing, class_id
            );
        }

        let snapshots: Vec<PortfolioSnapshot> = holders
            .iter()
            .map(|enrollment| {
                PortfolioSnapshot::new(
                    enrollment.student_id,
                    class_id,
                    value_holdings(&enrollment.holdings, &quotes),
                    run_at,
                )
            })
            .collect();

        self.snapshots
            .save_all(&snapshots)
            .await
            .context("Failed to save snapshots")?;

        debug!(
            "PortfolioValuationJob: Class {} valued ({} snapshots, {} symbols)",
            class_id,
            snapshots.len(),
            symbols.len()
        );
        Ok(snapshots.len())
    }
}
