//! Broker API façade: the single entry point a strategy
//! talks to. Wires `engine::MatchingEngine`, `account::AccountKernel` and
//! `persistence::PersistenceStore` together behind one struct and a mutex,
//! exposing submit/modify/cancel/query operations and the bar-driven
//! `on_bar` pipeline.

pub mod auto_update;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::error;

use crate::account::AccountKernel;
use crate::config::{BrokerConfig, SnapshotCadence};
use crate::cost::CostModel;
use crate::domain::ids::IdSequence;
use crate::domain::{
    AccountHistory, Bar, Order, OrderId, OrderType, Position, PositionId, Side, Symbol,
    TimeInForce, Trade,
};
use crate::engine::MatchingEngine;
use crate::error::BrokerError;
use crate::persistence::{ChangeEvent, ChangeFeed, PersistenceStore};
use crate::rng::BrokerRng;

use auto_update::AutoUpdateHandle;

static ORDER_IDS: IdSequence = IdSequence::new("ORD");

/// Result of `submit_order`: policy rejects surface here
/// rather than as a propagated error.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub success: bool,
    pub order_id: Option<OrderId>,
    pub error: Option<String>,
}

/// Result of `cancel_order` / `modify_order` / `close_position`.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl ActionOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Snapshot of account-level figures for `get_account_info`.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
    pub free_margin: Decimal,
    pub margin_level: Option<Decimal>,
    pub open_position_count: usize,
    pub pending_order_count: usize,
    pub total_realized_pnl: Decimal,
    pub total_trades: i64,
    pub total_commission_paid: Decimal,
}

/// Optional filters for `get_order_history`.
#[derive(Debug, Clone, Default)]
pub struct OrderHistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<crate::domain::OrderStatus>,
}

/// Optional filters for `get_trade_history`.
#[derive(Debug, Clone, Default)]
pub struct TradeHistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub symbol: Option<Symbol>,
}

struct BrokerState {
    config: BrokerConfig,
    engine: MatchingEngine,
    account: AccountKernel,
    rng: BrokerRng,
    last_bar: HashMap<Symbol, Bar>,
    bars_since_snapshot: u32,
    last_snapshot_wall: Instant,
    current_day: Option<NaiveDate>,
    day_start_balance: Decimal,
}

/// The in-process paper-trading broker. Cheaply cloneable handles are not
/// provided directly; share it via `Arc<Broker>` (required by
/// `start_auto_update`, which hands the background thread its own strong
/// reference).
pub struct Broker {
    state: Mutex<BrokerState>,
    store: Arc<dyn PersistenceStore>,
    feed: Arc<ChangeFeed>,
    auto_update: Mutex<Option<AutoUpdateHandle>>,
}

impl Broker {
    pub fn new(config: BrokerConfig, store: Arc<dyn PersistenceStore>, seed: u64) -> Self {
        let initial_balance = config.account.initial_balance;
        let state = BrokerState {
            account: AccountKernel::new(config.clone()),
            config,
            engine: MatchingEngine::new(),
            rng: BrokerRng::seeded(seed),
            last_bar: HashMap::new(),
            bars_since_snapshot: 0,
            last_snapshot_wall: Instant::now(),
            current_day: None,
            day_start_balance: initial_balance,
        };
        Self {
            state: Mutex::new(state),
            store,
            feed: ChangeFeed::new(),
            auto_update: Mutex::new(None),
        }
    }

    pub fn change_feed(&self) -> Arc<ChangeFeed> {
        self.feed.clone()
    }

    /// Read-only view of the engine's current pending set.
    pub fn orders(&self) -> Vec<Order> {
        let state = self.state.lock().expect("broker state mutex poisoned");
        let mut orders: Vec<Order> = state.engine.pending_orders().cloned().collect();
        orders.sort_by(|a, b| a.created_time.cmp(&b.created_time).then(a.order_id.cmp(&b.order_id)));
        orders
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &self,
        symbol: Symbol,
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        time_in_force: TimeInForce,
        strategy_name: Option<String>,
        now: DateTime<Utc>,
    ) -> SubmitOutcome {
        if let Err(e) = Order::validate(order_type, quantity, limit_price, stop_price) {
            return SubmitOutcome {
                success: false,
                order_id: None,
                error: Some(e.to_string()),
            };
        }

        let mut state = self.state.lock().expect("broker state mutex poisoned");

        let reference_price = limit_price
            .or(stop_price)
            .or_else(|| state.last_bar.get(&symbol).map(|b| b.close))
            .unwrap_or(Decimal::ZERO);
        let open_and_pending =
            state.account.open_positions().count() + state.engine.pending_orders().count();

        if let Err(reason) = state.account.pre_trade_check(
            &symbol,
            quantity,
            reference_price,
            open_and_pending,
            &mut state.rng,
        ) {
            let mut order = Order::new(
                OrderId::new(ORDER_IDS.next()),
                symbol,
                order_type,
                side,
                quantity,
                limit_price,
                stop_price,
                time_in_force,
                None,
                stop_loss,
                take_profit,
                strategy_name,
                now,
            );
            order.reject(reason.to_string(), now);
            if let Err(e) = self.store.save_order(&order) {
                error!(error = %e, "failed to persist rejected order");
            }
            self.feed.publish(ChangeEvent::OrderUpdated(order));
            return SubmitOutcome {
                success: false,
                order_id: None,
                error: Some(reason.to_string()),
            };
        }

        let order = Order::new(
            OrderId::new(ORDER_IDS.next()),
            symbol,
            order_type,
            side,
            quantity,
            limit_price,
            stop_price,
            time_in_force,
            None,
            stop_loss,
            take_profit,
            strategy_name,
            now,
        );

        if let Err(e) = self.store.save_order(&order) {
            error!(error = %e, "failed to persist new order, submit rolled back");
            return SubmitOutcome {
                success: false,
                order_id: None,
                error: Some(e.to_string()),
            };
        }

        let order_id = match state.engine.submit(order.clone()) {
            Ok(id) => id,
            Err(e) => {
                return SubmitOutcome {
                    success: false,
                    order_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        self.feed.publish(ChangeEvent::OrderUpdated(order));

        SubmitOutcome {
            success: true,
            order_id: Some(order_id),
            error: None,
        }
    }

    pub fn cancel_order(
        &self,
        order_id: &OrderId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let mut state = self.state.lock().expect("broker state mutex poisoned");
        match state.engine.cancel(order_id, reason, now) {
            Ok(()) => {
                if let Some(order) = state.engine.get(order_id).cloned() {
                    if let Err(e) = self.store.update_order(&order) {
                        error!(error = %e, "failed to persist order cancellation");
                    }
                    self.feed.publish(ChangeEvent::OrderUpdated(order));
                } else if let Ok(Some(mut order)) = self.store.load_order(order_id) {
                    order.cancel(None, now);
                    let _ = self.store.update_order(&order);
                    self.feed.publish(ChangeEvent::OrderUpdated(order));
                }
                ActionOutcome::ok()
            }
            Err(e) => ActionOutcome::err(e.to_string()),
        }
    }

    pub fn modify_order(
        &self,
        order_id: &OrderId,
        new_quantity: Option<Decimal>,
        new_limit_price: Option<Decimal>,
        new_stop_price: Option<Decimal>,
    ) -> ActionOutcome {
        let mut state = self.state.lock().expect("broker state mutex poisoned");
        match state
            .engine
            .modify(order_id, new_quantity, new_limit_price, new_stop_price)
        {
            Ok(()) => {
                if let Some(order) = state.engine.get(order_id).cloned() {
                    if let Err(e) = self.store.update_order(&order) {
                        error!(error = %e, "failed to persist order modification");
                    }
                    self.feed.publish(ChangeEvent::OrderUpdated(order));
                }
                ActionOutcome::ok()
            }
            Err(e) => ActionOutcome::err(e.to_string()),
        }
    }

    pub fn get_positions(&self, symbol: Option<&Symbol>) -> Vec<Position> {
        let state = self.state.lock().expect("broker state mutex poisoned");
        let mut positions: Vec<Position> = state
            .account
            .positions()
            .filter(|p| symbol.map_or(true, |s| &p.symbol == s))
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.open_time.cmp(&b.open_time).then(a.position_id.cmp(&b.position_id)));
        positions
    }

    pub fn get_account_info(&self) -> AccountInfo {
        let state = self.state.lock().expect("broker state mutex poisoned");
        AccountInfo {
            balance: state.account.balance(),
            equity: state.account.equity(),
            margin_used: state.account.margin_used(),
            free_margin: state.account.free_margin(),
            margin_level: state.account.margin_level(),
            open_position_count: state.account.open_positions().count(),
            pending_order_count: state.engine.pending_orders().count(),
            total_realized_pnl: state.account.total_realized_pnl(),
            total_trades: state.account.total_trades(),
            total_commission_paid: state.account.total_commission_paid(),
        }
    }

    /// Order history from the durable store; empty on no matches rather
    /// than an error.
    pub fn get_order_history(&self, filter: OrderHistoryFilter) -> Vec<Order> {
        match self.store.load_orders() {
            Ok(orders) => orders
                .into_iter()
                .filter(|o| filter.from.map_or(true, |from| o.created_time >= from))
                .filter(|o| filter.to.map_or(true, |to| o.created_time <= to))
                .filter(|o| filter.status.map_or(true, |status| o.status == status))
                .collect(),
            Err(e) => {
                error!(error = %e, "failed to load order history");
                Vec::new()
            }
        }
    }

    pub fn get_trade_history(&self, filter: TradeHistoryFilter) -> Vec<Trade> {
        match self.store.load_trades() {
            Ok(trades) => trades
                .into_iter()
                .filter(|t| filter.from.map_or(true, |from| t.exit_time >= from))
                .filter(|t| filter.to.map_or(true, |to| t.exit_time <= to))
                .filter(|t| filter.symbol.as_ref().map_or(true, |s| &t.symbol == s))
                .collect(),
            Err(e) => {
                error!(error = %e, "failed to load trade history");
                Vec::new()
            }
        }
    }

    pub fn close_position(
        &self,
        position_id: &PositionId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let mut state = self.state.lock().expect("broker state mutex poisoned");
        let symbol = match state.account.position(position_id) {
            Some(p) => p.symbol.clone(),
            None => return ActionOutcome::err(BrokerError::UnknownPosition(position_id.clone()).to_string()),
        };
        let bar = match state.last_bar.get(&symbol).cloned() {
            Some(b) => b,
            None => {
                return ActionOutcome::err(format!(
                    "no bar seen yet for {symbol}, cannot resolve a close price"
                ))
            }
        };
        let cost = CostModel::for_symbol(&state.config, &symbol);
        match state.account.close_position(
            position_id,
            reason,
            bar.bid,
            bar.ask,
            &cost,
            now,
        ) {
            Ok(closed) => {
                self.persist_closed_trade(&closed);
                ActionOutcome::ok()
            }
            Err(e) => ActionOutcome::err(e.to_string()),
        }
    }

    /// Drives one bar through the engine and account kernel, in order:
    /// matching pass -> fill application -> per-bar position updates /
    /// SL-TP -> optional snapshot.
    pub fn on_bar(&self, symbol: &Symbol, bar: &Bar, now: DateTime<Utc>) {
        let mut state = self.state.lock().expect("broker state mutex poisoned");
        state.last_bar.insert(symbol.clone(), bar.clone());

        let cost = CostModel::for_symbol(&state.config, symbol);

        let bar_date = bar.time.date_naive();
        let day_rolled = state.current_day.map_or(false, |d| bar_date > d);
        if day_rolled {
            state.account.apply_swap_rollover(&cost);
        }
        if state.current_day != Some(bar_date) {
            state.current_day = Some(bar_date);
            state.day_start_balance = state.account.balance();
        }

        let balance_before = state.account.balance();

        let pre_bar_orders: HashMap<OrderId, Order> = state
            .engine
            .pending_orders()
            .filter(|o| &o.symbol == symbol)
            .map(|o| (o.order_id.clone(), o.clone()))
            .collect();

        let (fills, updated_orders) = state.engine.on_bar(symbol, bar, &cost, &mut state.rng, now);

        for fill in &fills {
            if let Err(e) = self.store.save_fill(fill) {
                error!(error = %e, "failed to persist fill");
            }
            self.feed.publish(ChangeEvent::FillRecorded(fill.clone()));

            if let Some(order) = pre_bar_orders.get(&fill.order_id) {
                let position = state.account.apply_fill(order, fill, &cost);
                if let Err(e) = self.store.update_position(&position) {
                    error!(error = %e, "failed to persist position after fill");
                }
                self.feed.publish(ChangeEvent::PositionUpdated(position));
            }
        }

        // `updated_orders` carries each order's authoritative final state for
        // this bar (fills applied, then any TIF expiry/cancellation), which a
        // pre-bar clone with a fill replayed onto it would miss for IOC/FOK
        // terminations that happen after the last fill.
        for order in &updated_orders {
            if let Err(e) = self.store.update_order(order) {
                error!(error = %e, "failed to persist order after bar");
            }
            self.feed.publish(ChangeEvent::OrderUpdated(order.clone()));
        }

        let closed = state.account.update_positions_for_bar(
            symbol,
            bar.close,
            bar.low,
            bar.high,
            &cost,
            &mut state.rng,
            now,
        );
        for closed_trade in &closed {
            self.persist_closed_trade(closed_trade);
        }

        state.bars_since_snapshot += 1;
        let balance_changed = state.account.balance() != balance_before;
        let cadence_due = match state.config.snapshot {
            SnapshotCadence::Bars(n) => state.bars_since_snapshot >= n.max(1),
            SnapshotCadence::Seconds(s) => state.last_snapshot_wall.elapsed().as_secs() >= s,
        };
        if balance_changed || !closed.is_empty() || cadence_due {
            self.take_snapshot(&mut state, now);
        }
    }

    fn persist_closed_trade(&self, closed: &crate::account::ClosedTrade) {
        if let Err(e) = self.store.update_position(&closed.position) {
            error!(error = %e, "failed to persist closed position");
        }
        self.feed.publish(ChangeEvent::PositionUpdated(closed.position.clone()));
        if let Err(e) = self.store.save_trade(&closed.trade) {
            error!(error = %e, "failed to persist trade");
        }
        self.feed.publish(ChangeEvent::TradeClosed(closed.trade.clone()));
    }

    fn take_snapshot(&self, state: &mut BrokerState, now: DateTime<Utc>) {
        let daily_pnl = state.account.balance() - state.day_start_balance;
        let snapshot = state.account.snapshot(
            now,
            state.engine.pending_orders().count() as i64,
            daily_pnl,
            state.day_start_balance,
        );
        if let Err(e) = self.store.save_account_snapshot(&snapshot) {
            error!(error = %e, "failed to persist account snapshot");
        }
        state.bars_since_snapshot = 0;
        state.last_snapshot_wall = Instant::now();
    }

    pub fn load_account_history(&self, limit: Option<i64>) -> Vec<AccountHistory> {
        self.store.load_account_history(limit).unwrap_or_else(|e| {
            error!(error = %e, "failed to load account history");
            Vec::new()
        })
    }

    pub fn start_auto_update(
        self: &Arc<Self>,
        source: Arc<dyn auto_update::BarSource>,
        symbol: Symbol,
    ) {
        let mut guard = self.auto_update.lock().expect("auto-update mutex poisoned");
        if guard.is_some() {
            return;
        }
        let interval_ms = {
            let state = self.state.lock().expect("broker state mutex poisoned");
            state.config.auto_update_interval_ms
        };
        *guard = Some(auto_update::spawn(
            Arc::clone(self),
            source,
            symbol,
            std::time::Duration::from_millis(interval_ms),
        ));
    }

    pub fn stop_auto_update(&self) {
        let mut guard = self.auto_update.lock().expect("auto-update mutex poisoned");
        if let Some(handle) = guard.take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn broker() -> Broker {
        Broker::new(BrokerConfig::default(), Arc::new(InMemoryStore::new()), 1)
    }

    fn bar(symbol: &Symbol, time: DateTime<Utc>, bid: Decimal, ask: Decimal, vol: u64) -> Bar {
        Bar::new(symbol.clone(), time, bid, ask, bid, bid, bid, ask, vol)
    }

    #[test]
    fn submit_then_cancel_before_any_fill_leaves_balance_unchanged() {
        let b = broker();
        let symbol = Symbol::new("EURUSD");
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let outcome = b.submit_order(
            symbol,
            OrderType::Limit,
            Side::Buy,
            dec!(1.0),
            Some(dec!(1.0500)),
            None,
            None,
            None,
            TimeInForce::Gtc,
            None,
            now,
        );
        assert!(outcome.success);
        let order_id = outcome.order_id.unwrap();
        let balance_before = b.get_account_info().balance;

        let cancel = b.cancel_order(&order_id, None, now);
        assert!(cancel.success);
        assert_eq!(b.get_account_info().balance, balance_before);
        assert!(b.orders().is_empty());

        let history = b.get_order_history(OrderHistoryFilter::default());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, crate::domain::OrderStatus::Cancelled);
    }

    #[test]
    fn market_buy_then_close_at_same_price_loses_only_costs() {
        let b = broker();
        let symbol = Symbol::new("EURUSD");
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

        let outcome = b.submit_order(
            symbol.clone(),
            OrderType::Market,
            Side::Buy,
            dec!(1.0),
            None,
            None,
            None,
            None,
            TimeInForce::Gtc,
            None,
            now,
        );
        assert!(outcome.success);

        let balance_before = b.get_account_info().balance;
        let b1 = bar(&symbol, now, dec!(1.0999), dec!(1.1001), 1000);
        b.on_bar(&symbol, &b1, now);

        let positions = b.get_positions(Some(&symbol));
        assert_eq!(positions.len(), 1);
        let position_id = positions[0].position_id.clone();

        let close_now = now + chrono::Duration::hours(1);
        let close_outcome = b.close_position(&position_id, Some("manual".into()), close_now);
        assert!(close_outcome.success);

        let balance_after = b.get_account_info().balance;
        assert!(balance_after < balance_before);

        let trades = b.get_trade_history(TradeHistoryFilter::default());
        assert_eq!(trades.len(), 1);
    }
}
