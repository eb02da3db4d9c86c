//! In-memory backend: same contract as [`super::sqlite::SqliteStore`] but
//! backed by plain maps, for fast unit tests and the replay-equivalence
//! check, where running two full SQLite files would
//! only add I/O noise to what is fundamentally a pure-logic comparison.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{AccountHistory, Fill, Order, OrderId, Position, Trade};
use crate::error::PersistenceError;

use super::PersistenceStore;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    fills: Vec<Fill>,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    account_history: Vec<AccountHistory>,
    next_snapshot_id: i64,
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceStore for InMemoryStore {
    fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .orders
            .insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    fn update_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.save_order(order)
    }

    fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .orders
            .get(order_id)
            .cloned())
    }

    fn load_orders(&self) -> Result<Vec<Order>, PersistenceError> {
        let mut orders: Vec<Order> = self
            .inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .orders
            .values()
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_time.cmp(&b.created_time).then(a.order_id.cmp(&b.order_id)));
        Ok(orders)
    }

    fn save_fill(&self, fill: &Fill) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .fills
            .push(fill.clone());
        Ok(())
    }

    fn load_fills_for_order(&self, order_id: &OrderId) -> Result<Vec<Fill>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .fills
            .iter()
            .filter(|f| &f.order_id == order_id)
            .cloned()
            .collect())
    }

    fn save_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .positions
            .insert(position.position_id.as_str().to_string(), position.clone());
        Ok(())
    }

    fn update_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.save_position(position)
    }

    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        let mut positions: Vec<Position> = self
            .inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .positions
            .values()
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.open_time.cmp(&b.open_time).then(a.position_id.cmp(&b.position_id)));
        Ok(positions)
    }

    fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        Ok(self
            .load_positions()?
            .into_iter()
            .filter(|p| p.is_open)
            .collect())
    }

    fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError> {
        self.inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .trades
            .push(trade.clone());
        Ok(())
    }

    fn load_trades(&self) -> Result<Vec<Trade>, PersistenceError> {
        Ok(self
            .inner
            .lock()
            .expect("in-memory store mutex poisoned")
            .trades
            .clone())
    }

    fn save_account_snapshot(&self, snapshot: &AccountHistory) -> Result<i64, PersistenceError> {
        let mut inner = self.inner.lock().expect("in-memory store mutex poisoned");
        inner.next_snapshot_id += 1;
        let id = inner.next_snapshot_id;
        let mut snapshot = snapshot.clone();
        snapshot.id = id;
        inner.account_history.push(snapshot);
        Ok(id)
    }

    fn load_account_history(&self, limit: Option<i64>) -> Result<Vec<AccountHistory>, PersistenceError> {
        let inner = self.inner.lock().expect("in-memory store mutex poisoned");
        let mut rows = inner.account_history.clone();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            let limit = limit.max(0) as usize;
            let start = rows.len().saturating_sub(limit);
            rows = rows[start..].to_vec();
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderType, Side, Symbol, TimeInForce};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample_order(id: &str) -> Order {
        Order::new(
            OrderId::new(id),
            Symbol::new("EURUSD"),
            OrderType::Market,
            Side::Buy,
            dec!(1),
            None,
            None,
            TimeInForce::Gtc,
            None,
            None,
            None,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn round_trips_an_order() {
        let store = InMemoryStore::new();
        let order = sample_order("ORD-1");
        store.save_order(&order).unwrap();
        let loaded = store.load_order(&order.order_id).unwrap().unwrap();
        assert_eq!(loaded.order_id, order.order_id);
    }

    #[test]
    fn snapshot_ids_are_assigned_in_order() {
        let store = InMemoryStore::new();
        let base = AccountHistory {
            id: 0,
            timestamp: Utc::now(),
            balance: dec!(10000),
            equity: dec!(10000),
            margin_used: dec!(0),
            free_margin: dec!(10000),
            margin_level: None,
            num_positions: 0,
            num_pending_orders: 0,
            daily_pnl: dec!(0),
            daily_return_pct: dec!(0),
            total_realized_pnl: dec!(0),
            total_trades: 0,
            total_commission_paid: dec!(0),
            drawdown_usd: dec!(0),
            drawdown_pct: dec!(0),
        };
        let first = store.save_account_snapshot(&base).unwrap();
        let second = store.save_account_snapshot(&base).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }
}
