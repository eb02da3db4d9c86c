//! End-to-end scenarios driving the broker façade exactly as a strategy
//! would: submit an order, feed bars through `on_bar`, inspect the resulting
//! positions/trades/account state.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use paper_broker::domain::OrderStatus;
use paper_broker::persistence::InMemoryStore;
use paper_broker::{
    Bar, Broker, BrokerConfig, OrderType, Side, Symbol, TimeInForce,
};

fn bar(symbol: &Symbol, time: chrono::DateTime<Utc>, bid: rust_decimal::Decimal, ask: rust_decimal::Decimal, vol: u64) -> Bar {
    Bar::new(symbol.clone(), time, bid, ask, bid, bid, bid, ask, vol)
}

fn broker_with(config: BrokerConfig) -> Broker {
    Broker::new(config, Arc::new(InMemoryStore::new()), 7)
}

/// Market buy, then the bar's close drifts up past the take-profit: the
/// position should close automatically with a positive net P&L.
#[test]
fn market_buy_hits_take_profit_and_closes_with_profit() {
    let b = broker_with(BrokerConfig::default());
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol.clone(),
        OrderType::Market,
        Side::Buy,
        dec!(1.0),
        None,
        None,
        None,
        Some(dec!(1.1100)),
        TimeInForce::Gtc,
        Some("scenario".into()),
        t0,
    );
    assert!(outcome.success);

    let entry_bar = bar(&symbol, t0, dec!(1.0999), dec!(1.1001), 1000);
    b.on_bar(&symbol, &entry_bar, t0);
    assert_eq!(b.get_positions(Some(&symbol)).len(), 1);

    let t1 = t0 + Duration::hours(1);
    let tp_bar = Bar::new(
        symbol.clone(), t1,
        dec!(1.1095), dec!(1.1120), dec!(1.1080), dec!(1.1100),
        dec!(1.1099), dec!(1.1101), 1000,
    );
    b.on_bar(&symbol, &tp_bar, t1);

    assert!(b.get_positions(Some(&symbol)).is_empty());
    let trades = b.get_trade_history(Default::default());
    assert_eq!(trades.len(), 1);
    assert!(trades[0].net_pnl > rust_decimal::Decimal::ZERO);
    assert_eq!(trades[0].exit_reason, "Take Profit");
}

/// Market buy with a stop-loss: a bar whose low trades through the stop
/// closes the position at a loss.
#[test]
fn market_buy_hits_stop_loss_and_closes_with_loss() {
    let b = broker_with(BrokerConfig::default());
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol.clone(),
        OrderType::Market,
        Side::Buy,
        dec!(1.0),
        None,
        None,
        Some(dec!(1.0950)),
        None,
        TimeInForce::Gtc,
        None,
        t0,
    );
    assert!(outcome.success);

    let entry_bar = bar(&symbol, t0, dec!(1.0999), dec!(1.1001), 1000);
    b.on_bar(&symbol, &entry_bar, t0);
    assert_eq!(b.get_positions(Some(&symbol)).len(), 1);

    let t1 = t0 + Duration::hours(1);
    let sl_bar = Bar::new(
        symbol.clone(), t1,
        dec!(1.0920), dec!(1.0999), dec!(1.0900), dec!(1.0930),
        dec!(1.0929), dec!(1.0931), 1000,
    );
    b.on_bar(&symbol, &sl_bar, t1);

    assert!(b.get_positions(Some(&symbol)).is_empty());
    let trades = b.get_trade_history(Default::default());
    assert_eq!(trades.len(), 1);
    assert!(trades[0].net_pnl < rust_decimal::Decimal::ZERO);
    assert_eq!(trades[0].exit_reason, "Stop Loss");
}

/// A resting limit order waits across several bars that never touch its
/// price, then fills partially and finally completely once price arrives,
/// with enough volume each bar to bound the fill size.
#[test]
fn limit_order_waits_then_fills_across_bars() {
    let b = broker_with(BrokerConfig::default());
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol.clone(),
        OrderType::Limit,
        Side::Buy,
        dec!(2.0),
        Some(dec!(1.1000)),
        None,
        None,
        None,
        TimeInForce::Gtc,
        None,
        t0,
    );
    assert!(outcome.success);
    let order_id = outcome.order_id.unwrap();

    let away_bar = bar(&symbol, t0, dec!(1.1049), dec!(1.1051), 1000);
    b.on_bar(&symbol, &away_bar, t0);
    assert_eq!(b.orders().len(), 1);

    let t1 = t0 + Duration::hours(1);
    let touch_bar = Bar::new(
        symbol.clone(), t1,
        dec!(1.1005), dec!(1.1018), dec!(1.0995), dec!(1.1015),
        dec!(1.0997), dec!(1.0999), 1,
    );
    b.on_bar(&symbol, &touch_bar, t1);
    let history = b.get_order_history(Default::default());
    let order = history.iter().find(|o| o.order_id == order_id).unwrap();
    assert_eq!(order.status, OrderStatus::PartialFilled);

    let t2 = t1 + Duration::hours(1);
    let fill_bar = Bar::new(
        symbol.clone(), t2,
        dec!(1.1005), dec!(1.1018), dec!(1.0995), dec!(1.1015),
        dec!(1.0997), dec!(1.0999), 1,
    );
    b.on_bar(&symbol, &fill_bar, t2);
    let history = b.get_order_history(Default::default());
    let order = history.iter().find(|o| o.order_id == order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert!(b.orders().is_empty());
}

/// A stop order converts to a market order once the trigger price is
/// touched — here breaking out above resistance.
#[test]
fn stop_order_triggers_on_breakout_and_fills_at_market() {
    let b = broker_with(BrokerConfig::default());
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol.clone(),
        OrderType::Stop,
        Side::Buy,
        dec!(1.0),
        None,
        Some(dec!(1.1050)),
        None,
        None,
        TimeInForce::Gtc,
        None,
        t0,
    );
    assert!(outcome.success);

    let quiet_bar = bar(&symbol, t0, dec!(1.1019), dec!(1.1021), 1000);
    b.on_bar(&symbol, &quiet_bar, t0);
    assert_eq!(b.orders().len(), 1);

    let t1 = t0 + Duration::hours(1);
    let breakout_bar = Bar::new(
        symbol.clone(), t1,
        dec!(1.1055), dec!(1.1075), dec!(1.1045), dec!(1.1070),
        dec!(1.1069), dec!(1.1071), 1000,
    );
    b.on_bar(&symbol, &breakout_bar, t1);

    assert!(b.orders().is_empty());
    assert_eq!(b.get_positions(Some(&symbol)).len(), 1);
    let trades = b.get_trade_history(Default::default());
    assert!(trades.is_empty());
}

/// An IOC order fills whatever volume the bar offers and cancels the rest
/// in the same bar rather than resting: the final persisted order status is
/// `Cancelled` with the filled quantity retained, not `PartialFilled`.
#[test]
fn ioc_order_partially_fills_then_cancels_same_bar() {
    let b = broker_with(BrokerConfig::default());
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol.clone(),
        OrderType::Limit,
        Side::Buy,
        dec!(10.0),
        Some(dec!(1.1000)),
        None,
        None,
        None,
        TimeInForce::Ioc,
        None,
        t0,
    );
    assert!(outcome.success);

    let thin_bar = bar(&symbol, t0, dec!(1.0999), dec!(1.1001), 6);
    b.on_bar(&symbol, &thin_bar, t0);

    assert!(b.orders().is_empty());
    let history = b.get_order_history(Default::default());
    let order = history.iter().find(|o| o.order_id == outcome.order_id.clone().unwrap()).unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.filled_quantity, dec!(6));
    assert_eq!(order.cancelled_reason.as_deref(), Some("IOC remainder"));
}

/// Insufficient margin for the requested notional is rejected pre-trade and
/// never reaches the matching engine. A limit price is supplied so the
/// pre-trade check has a non-zero reference price to size margin against
/// even though no bar has been seen yet for the symbol.
#[test]
fn oversized_order_is_rejected_for_insufficient_margin() {
    let mut config = BrokerConfig::default();
    config.account.initial_balance = dec!(100);
    let b = broker_with(config);
    let symbol = Symbol::new("EURUSD");
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

    let outcome = b.submit_order(
        symbol,
        OrderType::Limit,
        Side::Buy,
        dec!(50.0),
        Some(dec!(1.1000)),
        None,
        None,
        None,
        TimeInForce::Gtc,
        None,
        t0,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("INSUFFICIENT_MARGIN"));
    assert!(b.orders().is_empty());
}
