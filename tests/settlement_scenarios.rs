mod common;

use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stocksim::domain::ledger::TransactionKind;

#[tokio::test]
async fn test_buy_then_sell_xyz() -> Result<()> {
    let t = common::test_app().await?;
    let class = t.class("Period 1", dec!(1000)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("XYZ", dec!(50.00)).await;
    let view = engine.buy(student, class, "XYZ", dec!(10)).await?;
    let ledger = view.class(class).expect("class in view");

    assert_eq!(ledger.class_name.as_deref(), Some("Period 1"));
    assert_eq!(ledger.balance, dec!(500.00));
    let position = ledger.position("XYZ").expect("position after buy");
    assert_eq!(position.lots.len(), 1);
    assert_eq!(position.lots[0].quantity, dec!(10));
    assert_eq!(position.lots[0].purchase_price, dec!(50.00));
    assert_eq!(position.cost_basis, dec!(500.00));
    assert_eq!(ledger.transactions.len(), 1);
    assert_eq!(ledger.transactions[0].kind, TransactionKind::Buy);
    assert_eq!(ledger.transactions[0].balance_after, dec!(500.00));
    assert_eq!(ledger.transactions[0].net_profit, None);

    t.quotes.set_price("XYZ", dec!(60.00)).await;
    let view = engine.sell(student, class, "XYZ", dec!(10)).await?;
    let ledger = view.class(class).expect("class in view");

    assert_eq!(ledger.balance, dec!(1100.00));
    assert!(ledger.position("XYZ").is_none());
    assert_eq!(ledger.transactions.len(), 2);
    let sell = &ledger.transactions[1];
    assert_eq!(sell.kind, TransactionKind::Sell);
    assert_eq!(sell.amount, dec!(-10));
    assert_eq!(sell.price, dec!(60.00));
    assert_eq!(sell.balance_after, dec!(1100.00));
    assert_eq!(sell.net_profit, Some(dec!(10.00)));

    Ok(())
}

#[tokio::test]
async fn test_fifo_sell_reports_average_profit() -> Result<()> {
    let t = common::test_app().await?;
    let class = t.class("Period 2", dec!(10000)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("XYZ", dec!(10)).await;
    engine.buy(student, class, "XYZ", dec!(5)).await?;
    t.quotes.set_price("XYZ", dec!(20)).await;
    engine.buy(student, class, "XYZ", dec!(5)).await?;

    t.quotes.set_price("XYZ", dec!(30)).await;
    let view = engine.sell(student, class, "XYZ", dec!(7)).await?;
    let ledger = view.class(class).expect("class in view");

    // 10000 - 50 - 100 + 210
    assert_eq!(ledger.balance, dec!(10060));

    let position = ledger.position("XYZ").expect("remaining position");
    assert_eq!(position.quantity, dec!(3));
    assert_eq!(position.lots.len(), 1);
    assert_eq!(position.lots[0].purchase_price, dec!(20));
    assert_eq!(position.cost_basis, dec!(60));

    let sell = ledger.transactions.last().expect("sell logged");
    let net_profit = sell.net_profit.expect("sell carries profit");
    assert_eq!(net_profit.round_dp(2), dec!(17.14));
    assert_eq!(sell.realized_profit().round_dp(8), dec!(120));

    Ok(())
}

#[tokio::test]
async fn test_buys_never_merge_lots() -> Result<()> {
    let t = common::test_app().await?;
    let class = t.class("Period 3", dec!(1000)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("ABC", dec!(10)).await;
    engine.buy(student, class, "ABC", dec!(1)).await?;
    let view = engine.buy(student, class, "abc ", dec!(2.5)).await?;

    let position = view
        .class(class)
        .and_then(|c| c.position("ABC"))
        .expect("position");
    assert_eq!(position.lots.len(), 2);
    assert_eq!(position.lots[0].quantity, dec!(1));
    assert_eq!(position.lots[1].quantity, dec!(2.5));
    assert_eq!(position.quantity, dec!(3.5));

    Ok(())
}

#[tokio::test]
async fn test_trade_sequence_stays_non_negative() -> Result<()> {
    let t = common::test_app().await?;
    let class = t.class("Period 4", dec!(500)).await?;
    let student = t.enrolled_student(class).await?;
    let engine = t.app.settlement_engine();

    // (price, side, quantity); rejected steps are expected along the way
    let steps = [
        (dec!(100), "buy", dec!(3)),
        (dec!(120), "buy", dec!(2)),
        (dec!(90), "sell", dec!(2)),
        (dec!(95), "buy", dec!(4)),
        (dec!(80), "sell", dec!(5)),
        (dec!(200), "buy", dec!(1.5)),
        (dec!(50), "sell", dec!(0.5)),
        (dec!(70), "sell", dec!(1)),
    ];

    let mut balance = dec!(500);
    let mut held = Decimal::ZERO;
    for (price, side, quantity) in steps {
        t.quotes.set_price("SEQ", price).await;
        let result = match side {
            "buy" => engine.buy(student, class, "SEQ", quantity).await,
            _ => engine.sell(student, class, "SEQ", quantity).await,
        };

        match result {
            Ok(view) => {
                let ledger = view.class(class).expect("class in view");
                let expected = match side {
                    "buy" => balance - price * quantity,
                    _ => balance + price * quantity,
                };
                assert_eq!(ledger.balance, expected);
                balance = ledger.balance;
                held = ledger.held_quantity("SEQ");
            }
            Err(e) => {
                assert!(
                    matches!(e.reason_code(), "insufficient_funds" | "insufficient_holdings"),
                    "unexpected rejection: {}",
                    e
                );
            }
        }

        let view = engine.ledger_view(student).await?;
        let ledger = view.class(class).expect("class in view");
        assert!(ledger.balance >= Decimal::ZERO);
        assert_eq!(ledger.balance, balance);
        assert_eq!(ledger.held_quantity("SEQ"), held);
        for position in &ledger.positions {
            assert!(position.quantity > Decimal::ZERO);
            assert!(position.lots.iter().all(|lot| lot.quantity > Decimal::ZERO));
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_view_spans_every_class() -> Result<()> {
    let t = common::test_app().await?;
    let first = t.class("Morning", dec!(1000)).await?;
    let second = t.class("Evening", dec!(2000)).await?;
    let student = t.enrolled_student(first).await?;
    t.app
        .persistence
        .ledger_repository
        .enroll(student, second)
        .await?;
    let engine = t.app.settlement_engine();

    t.quotes.set_price("XYZ", dec!(10)).await;
    let view = engine.buy(student, second, "XYZ", dec!(5)).await?;

    assert_eq!(view.classes.len(), 2);
    assert_eq!(view.balance(first), Some(dec!(1000)));
    assert_eq!(view.balance(second), Some(dec!(1950)));
    assert!(view.class(first).expect("first").positions.is_empty());

    Ok(())
}
