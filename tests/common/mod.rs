#![allow(dead_code)]

use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use stocksim::application::bootstrap::persistence::PersistenceBootstrap;
use stocksim::application::system::Application;
use stocksim::config::Config;
use stocksim::domain::ledger::{ClassId, StudentId};
use stocksim::infrastructure::mock::MockQuoteGateway;
use stocksim::infrastructure::persistence::Database;
use uuid::Uuid;

/// Application over a private in-memory ledger with scripted quotes
pub struct TestApp {
    pub app: Application,
    pub quotes: MockQuoteGateway,
}

pub async fn test_app() -> Result<TestApp> {
    let db = Database::in_memory().await?;
    build(db, Duration::from_millis(300)).await
}

/// Same wiring over an opened database, with a custom quote timeout
pub async fn build(db: Database, quote_timeout: Duration) -> Result<TestApp> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    let mut config = Config::for_tests("sqlite::memory:");
    config.quote.quote_timeout = quote_timeout;
    config.quote.bulk_quote_timeout = quote_timeout;

    let quotes = MockQuoteGateway::new();
    let persistence = PersistenceBootstrap::from_database(db);
    let app = Application::with_parts(config, persistence, Arc::new(quotes.clone()))?;

    Ok(TestApp { app, quotes })
}

impl TestApp {
    pub async fn class(&self, name: &str, opening_balance: Decimal) -> Result<ClassId> {
        let class = self
            .app
            .persistence
            .ledger_repository
            .create_class(name, opening_balance)
            .await?;
        Ok(class.id)
    }

    pub async fn enrolled_student(&self, class_id: ClassId) -> Result<StudentId> {
        let student = Uuid::new_v4();
        self.app
            .persistence
            .ledger_repository
            .enroll(student, class_id)
            .await?;
        Ok(student)
    }
}
