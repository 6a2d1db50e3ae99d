mod common;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use stocksim::domain::errors::SettlementError;
use stocksim::infrastructure::persistence::Database;

/// File-backed ledger so the pool hands out several real connections
async fn file_app(dir: &tempfile::TempDir) -> Result<common::TestApp> {
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let db = Database::new(&url).await?;
    common::build(db, Duration::from_secs(2)).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sells_never_oversell() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let t = file_app(&dir).await?;
    let class = t.class("Period 1", dec!(1000)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("XYZ", dec!(10)).await;
    engine.buy(student, class, "XYZ", dec!(5)).await?;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.sell(student, class, "XYZ", dec!(1)).await
        }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => settled += 1,
            Err(SettlementError::InsufficientHoldings { .. }) => {}
            Err(e) => panic!("unexpected failure: {}", e),
        }
    }

    assert_eq!(settled, 5);
    let view = engine.ledger_view(student).await?;
    let ledger = view.class(class).expect("class in view");
    assert_eq!(ledger.balance, dec!(1000));
    assert_eq!(ledger.held_quantity("XYZ"), Decimal::ZERO);
    assert_eq!(ledger.transactions.len(), 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buys_never_overspend() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let t = file_app(&dir).await?;
    let class = t.class("Period 1", dec!(100)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("XYZ", dec!(30)).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.buy(student, class, "XYZ", dec!(1)).await
        }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => settled += 1,
            Err(SettlementError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected failure: {}", e),
        }
    }

    assert_eq!(settled, 3);
    let view = engine.ledger_view(student).await?;
    let ledger = view.class(class).expect("class in view");
    assert_eq!(ledger.balance, dec!(10));
    assert_eq!(ledger.held_quantity("XYZ"), dec!(3));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ledger_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (class, student) = {
        let t = file_app(&dir).await?;
        let class = t.class("Period 1", dec!(1000)).await?;
        let student = t.enrolled_student(class).await?;
        t.quotes.set_price("XYZ", dec!(12.34)).await;
        t.app
            .settlement_engine()
            .buy(student, class, "XYZ", dec!(2))
            .await?;
        t.app.persistence.db.pool.close().await;
        (class, student)
    };

    let t = file_app(&dir).await?;
    let view = t.app.settlement_engine().ledger_view(student).await?;
    let ledger = view.class(class).expect("class in view");

    assert_eq!(ledger.balance, dec!(975.32));
    assert_eq!(ledger.held_quantity("XYZ"), dec!(2));
    assert_eq!(ledger.transactions[0].price, dec!(12.34));

    Ok(())
}
