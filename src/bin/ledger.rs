//! StockSim Ledger - command-line access to the ledger and the quote gateway
//!
//! Every command prints JSON to stdout; logs go to stderr.
//!
//! # Usage
//! ```sh
//! cargo run --bin ledger -- create-class --name "Econ 101"
//! cargo run --bin ledger -- enroll --student <uuid> --class <uuid>
//! cargo run --bin ledger -- buy --student <uuid> --class <uuid> --symbol AAPL --quantity 2.5
//! cargo run --bin ledger -- view --student <uuid>
//! cargo run --bin ledger -- symbols --exchange US
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use stocksim::application::system::Application;
use stocksim::config::Config;
use stocksim::domain::errors::SettlementError;
use stocksim::domain::ledger::{DEFAULT_CLASS_BALANCE, LedgerView, normalize_symbol};
use tracing::Level;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "StockSim ledger tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a class with a starting balance for new enrollments
    CreateClass {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value_t = DEFAULT_CLASS_BALANCE)]
        balance: Decimal,
    },
    /// Enroll a student in a class
    Enroll {
        #[arg(long)]
        student: Uuid,

        #[arg(long)]
        class: Uuid,
    },
    /// Buy shares at the live price
    Buy {
        #[arg(long)]
        student: Uuid,

        #[arg(long)]
        class: Uuid,

        #[arg(short, long)]
        symbol: String,

        #[arg(short, long)]
        quantity: Decimal,
    },
    /// Sell shares at the live price, oldest lots first
    Sell {
        #[arg(long)]
        student: Uuid,

        #[arg(long)]
        class: Uuid,

        #[arg(short, long)]
        symbol: String,

        #[arg(short, long)]
        quantity: Decimal,
    },
    /// Balances, positions and transactions of a student
    View {
        #[arg(long)]
        student: Uuid,
    },
    /// Current price of one symbol
    Quote {
        #[arg(short, long)]
        symbol: String,
    },
    /// Daily candles for the last N days
    Candles {
        #[arg(short, long)]
        symbol: String,

        #[arg(short, long, default_value = "30", value_parser = clap::value_parser!(i64).range(1..=MAX_CANDLE_DAYS))]
        days: i64,
    },
    /// Symbol directory of an exchange
    Symbols {
        #[arg(short, long, default_value = "US")]
        exchange: String,
    },
    /// Realized profit leaderboard of a class
    Standings {
        #[arg(long)]
        class: Uuid,
    },
    /// Valuation snapshots of one enrollment
    History {
        #[arg(long)]
        student: Uuid,

        #[arg(long)]
        class: Uuid,
    },
    /// Value every portfolio now
    ValueNow,
}

/// Ten years of daily candles
const MAX_CANDLE_DAYS: i64 = 3650;

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: &'a str,
    status: u16,
    settled: bool,
    message: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `[to - days, to]`, rejecting spans chrono cannot represent
fn candle_window(days: i64, to: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let from = Duration::try_days(days)
        .and_then(|span| to.checked_sub_signed(span))
        .with_context(|| format!("Candle range of {} days is out of range", days))?;
    Ok((from, to))
}

/// Print a settlement outcome; rejections become a JSON error object and a failing exit.
fn print_settlement(result: Result<LedgerView, SettlementError>) -> Result<()> {
    match result {
        Ok(view) => print_json(&view),
        Err(e) => {
            let output = ErrorOutput {
                error: e.reason_code(),
                status: e.status_code(),
                settled: e.is_settled(),
                message: e.to_string(),
            };
            eprintln!("{}", serde_json::to_string_pretty(&output)?);
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Logs on stderr so stdout stays machine-readable
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(stderr_layer)
        .init();

    let config = Config::from_env()?;
    let app = Application::build(config).await?;
    let ledger = app.persistence.ledger_repository.clone();
    let engine = app.settlement_engine();

    match cli.command {
        Commands::CreateClass { name, balance } => {
            let class = ledger.create_class(&name, balance).await?;
            print_json(&class)?;
        }
        Commands::Enroll { student, class } => {
            let balance = ledger.enroll(student, class).await?;
            print_json(&serde_json::json!({
                "student_id": student,
                "class_id": class,
                "balance": balance,
            }))?;
        }
        Commands::Buy {
            student,
            class,
            symbol,
            quantity,
        } => {
            print_settlement(engine.buy(student, class, &symbol, quantity).await)?;
        }
        Commands::Sell {
            student,
            class,
            symbol,
            quantity,
        } => {
            print_settlement(engine.sell(student, class, &symbol, quantity).await)?;
        }
        Commands::View { student } => {
            print_json(&engine.ledger_view(student).await?)?;
        }
        Commands::Quote { symbol } => {
            let symbol = normalize_symbol(&symbol);
            let price = app.services.quote_gateway.quote(&symbol).await?;
            print_json(&serde_json::json!({ "symbol": symbol, "price": price }))?;
        }
        Commands::Candles { symbol, days } => {
            let (from, to) = candle_window(days, Utc::now())?;
            let candles = app
                .services
                .quote_gateway
                .candles(&normalize_symbol(&symbol), from, to)
                .await?;
            print_json(&candles)?;
        }
        Commands::Symbols { exchange } => {
            let symbols = app
                .services
                .quote_gateway
                .symbols(&exchange.trim().to_uppercase())
                .await?;
            print_json(&symbols)?;
        }
        Commands::Standings { class } => {
            print_json(&ledger.class_standings(class).await?)?;
        }
        Commands::History { student, class } => {
            let history = app
                .persistence
                .snapshot_repository
                .history(student, class)
                .await?;
            print_json(&history)?;
        }
        Commands::ValueNow => {
            print_json(&app.run_valuation_once().await?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_window() {
        let to = Utc::now();
        let (from, end) = candle_window(30, to).unwrap();
        assert_eq!(end - from, Duration::days(30));

        assert!(candle_window(9_999_999_999_999, to).is_err());
        assert!(candle_window(i64::MAX, to).is_err());
    }

    #[test]
    fn test_days_bounded_at_parse_time() {
        assert!(Cli::try_parse_from(["ledger", "candles", "-s", "AAPL", "-d", "9999999999999"]).is_err());
        assert!(Cli::try_parse_from(["ledger", "candles", "-s", "AAPL", "-d", "0"]).is_err());
        assert!(Cli::try_parse_from(["ledger", "candles", "-s", "AAPL", "-d", "365"]).is_ok());
        assert!(Cli::try_parse_from(["ledger", "symbols"]).is_ok());
    }
}
