//! Prometheus metrics definitions for StockSim
//!
//! All metrics use the `stocksim_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus metrics for settlement and valuation
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Trades by side and outcome (settled, rejected)
    pub trades_total: CounterVec,
    /// Rejected trades by reason code
    pub trade_rejections_total: CounterVec,
    /// Quote provider latency in seconds
    pub quote_latency_seconds: HistogramVec,
    /// Valuation runs by status
    pub valuation_runs_total: CounterVec,
    /// Portfolio snapshots persisted
    pub snapshots_written_total: Counter,
    /// Classes skipped by a valuation run
    pub valuation_class_failures_total: Counter,
    /// Unix time of the last finished valuation run
    pub last_valuation_timestamp: Gauge,
    /// Uptime in seconds
    pub uptime_seconds: Gauge,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades_total = CounterVec::new(
            Opts::new("stocksim_trades_total", "Trades by side and outcome"),
            &["side", "outcome"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let trade_rejections_total = CounterVec::new(
            Opts::new(
                "stocksim_trade_rejections_total",
                "Rejected trades by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(trade_rejections_total.clone()))?;

        let quote_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "stocksim_quote_latency_seconds",
                "Quote provider latency in seconds",
            )
            .buckets(vec![
                0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0,
            ]),
            &["endpoint"],
        )?;
        registry.register(Box::new(quote_latency_seconds.clone()))?;

        let valuation_runs_total = CounterVec::new(
            Opts::new("stocksim_valuation_runs_total", "Valuation runs by status"),
            &["status"],
        )?;
        registry.register(Box::new(valuation_runs_total.clone()))?;

        let snapshots_written_total = Counter::with_opts(Opts::new(
            "stocksim_snapshots_written_total",
            "Portfolio snapshots persisted",
        ))?;
        registry.register(Box::new(snapshots_written_total.clone()))?;

        let valuation_class_failures_total = Counter::with_opts(Opts::new(
            "stocksim_valuation_class_failures_total",
            "Classes skipped by a valuation run",
        ))?;
        registry.register(Box::new(valuation_class_failures_total.clone()))?;

        let last_valuation_timestamp = Gauge::with_opts(Opts::new(
            "stocksim_last_valuation_timestamp",
            "Unix time of the last finished valuation run",
        ))?;
        registry.register(Box::new(last_valuation_timestamp.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "stocksim_uptime_seconds",
            "Server uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            trades_total,
            trade_rejections_total,
            quote_latency_seconds,
            valuation_runs_total,
            snapshots_written_total,
            valuation_class_failures_total,
            last_valuation_timestamp,
            uptime_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn record_settled(&self, side: &str) {
        self.trades_total.with_label_values(&[side, "settled"]).inc();
    }

    pub fn record_rejected(&self, side: &str, reason: &str) {
        self.trades_total.with_label_values(&[side, "rejected"]).inc();
        self.trade_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Observe quote provider latency
    pub fn observe_quote_latency(&self, endpoint: &str, latency: f64) {
        self.quote_latency_seconds
            .with_label_values(&[endpoint])
            .observe(latency);
    }

    pub fn record_valuation_run(&self, status: &str, snapshots: usize, failed_classes: usize) {
        self.valuation_runs_total.with_label_values(&[status]).inc();
        self.snapshots_written_total.inc_by(snapshots as f64);
        self.valuation_class_failures_total
            .inc_by(failed_classes as f64);
        self.last_valuation_timestamp
            .set(chrono::Utc::now().timestamp() as f64);
    }

    /// Trades with `outcome` across both sides
    pub fn trades_with_outcome(&self, outcome: &str) -> u64 {
        ["buy", "sell"]
            .into_iter()
            .map(|side| self.trades_total.with_label_values(&[side, outcome]).get())
            .sum::<f64>() as u64
    }
}
