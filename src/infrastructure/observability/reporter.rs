//! Push-based metrics reporter for StockSim
//!
//! Periodically outputs metrics as structured JSON to stdout.

use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub trades: TradeSnapshot,
    pub valuation: ValuationSnapshot,
}

#[derive(Serialize)]
pub struct TradeSnapshot {
    pub settled: u64,
    pub rejected: u64,
}

#[derive(Serialize)]
pub struct ValuationSnapshot {
    pub snapshots_written: u64,
    pub class_failures: u64,
    pub last_run_timestamp: Option<i64>,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
pub struct MetricsReporter {
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Run the reporter until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("MetricsReporter: Shutting down");
                        return;
                    }
                    continue;
                }
            }

            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    // Use a special prefix so logs can be easily filtered
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Trades settled: {} | rejected: {} | Uptime: {}s",
                        snapshot.trades.settled, snapshot.trades.rejected, snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("Failed to serialize metrics: {}", e),
            }
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        self.metrics.uptime_seconds.set(uptime as f64);

        let last_run = self.metrics.last_valuation_timestamp.get() as i64;

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            trades: TradeSnapshot {
                settled: self.metrics.trades_with_outcome("settled"),
                rejected: self.metrics.trades_with_outcome("rejected"),
            },
            valuation: ValuationSnapshot {
                snapshots_written: self.metrics.snapshots_written_total.get() as u64,
                class_failures: self.metrics.valuation_class_failures_total.get() as u64,
                last_run_timestamp: (last_run > 0).then_some(last_run),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_snapshot_collection() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.record_settled("buy");
        let reporter = MetricsReporter::new(metrics, 60);

        let snapshot = reporter.collect_snapshot();

        assert_eq!(snapshot.trades.settled, 1);
        assert_eq!(snapshot.valuation.last_run_timestamp, None);
        assert!(!snapshot.timestamp.is_empty());
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        let reporter = MetricsReporter::new(metrics, 3600);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(reporter.run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}
