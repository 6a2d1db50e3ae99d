//! StockSim Server - settlement services and the daily valuation job
//!
//! Runs the valuation scheduler and the push-based metrics reporter until
//! Ctrl+C. Metrics are pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! VALUATION_TIMEZONE=America/New_York cargo run --bin server
//! cargo run --bin server -- --once   # value every portfolio now and exit
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - Ledger database (default: sqlite://stocksim.db)
//! - `VALUATION_ENABLED` - Run the daily scheduler (default: true)
//! - `VALUATION_TIMEZONE` / `VALUATION_HOUR` - Local time of the daily run (default: America/New_York, 0)
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Interval in seconds between metric outputs (default: 60)

use anyhow::Result;
use clap::Parser;
use stocksim::application::system::Application;
use stocksim::config::Config;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "StockSim settlement and valuation server", long_about = None)]
struct Cli {
    /// Run one valuation immediately, print its report and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("StockSim Server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Database={}, Quotes={:?}, Valuation={} at {:02}:00 {}",
        config.database_url,
        config.quote.provider,
        if config.valuation.enabled { "on" } else { "off" },
        config.valuation.hour,
        config.valuation.timezone
    );

    let app = Application::build(config).await?;

    if cli.once {
        let report = app.run_valuation_once().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let handle = app.start();
    info!("Server running. Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    handle.shutdown().await;

    Ok(())
}
