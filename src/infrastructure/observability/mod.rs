//! Push-based observability for StockSim
//!
//! Metrics are kept in a Prometheus registry and pushed out as periodic
//! structured JSON logs. Nothing listens for incoming requests.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
