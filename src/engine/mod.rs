//! Order Matching Engine. Holds only non-terminal orders,
//! keyed by id for O(1) cancel/modify. Matches against a bar stream rather
//! than a counterparty book: orders are scanned in `(created_time,
//! order_id)` order instead of price-sorted, since there is no opposite
//! side to cross.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::cost::CostModel;
use crate::domain::{
    Bar, Fill, FillId, Order, OrderId, OrderStatus, OrderType, Side, Symbol, TimeInForce,
};
use crate::domain::ids::IdSequence;
use crate::error::{BrokerError, BrokerResult};
use crate::rng::BrokerRng;

static FILL_IDS: IdSequence = IdSequence::new("FIL");

pub struct MatchingEngine {
    pending_orders: HashMap<OrderId, Order>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self {
            pending_orders: HashMap::new(),
        }
    }

    pub fn submit(&mut self, order: Order) -> BrokerResult<OrderId> {
        if order.is_terminal() {
            return Err(BrokerError::InvalidParameter(
                "cannot submit an order already in a terminal state".into(),
            ));
        }
        let id = order.order_id.clone();
        self.pending_orders.insert(id.clone(), order);
        debug!(order_id = %id, "order admitted to pending set");
        Ok(id)
    }

    pub fn cancel(
        &mut self,
        order_id: &OrderId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> BrokerResult<()> {
        let order = self
            .pending_orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(order_id.clone()))?;
        if order.is_terminal() {
            // Idempotent, not an error.
            return Ok(());
        }
        order.cancel(reason, now);
        self.pending_orders.remove(order_id);
        Ok(())
    }

    pub fn modify(
        &mut self,
        order_id: &OrderId,
        new_quantity: Option<Decimal>,
        new_limit_price: Option<Decimal>,
        new_stop_price: Option<Decimal>,
    ) -> BrokerResult<()> {
        let order = self
            .pending_orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(order_id.clone()))?;
        order.modify(new_quantity, new_limit_price, new_stop_price)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.pending_orders.get(order_id)
    }

    pub fn pending_orders(&self) -> impl Iterator<Item = &Order> {
        self.pending_orders.values()
    }

    fn sorted_ids_for_symbol(&self, symbol: &Symbol) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self
            .pending_orders
            .values()
            .filter(|o| &o.symbol == symbol)
            .map(|o| o.order_id.clone())
            .collect();
        ids.sort_by(|a, b| {
            let oa = &self.pending_orders[a];
            let ob = &self.pending_orders[b];
            oa.created_time.cmp(&ob.created_time).then(a.cmp(b))
        });
        ids
    }

    /// Runs one bar's matching pass for `symbol`, mutating every affected
    /// order in place. Returns the fills produced, and a snapshot of every
    /// order whose state changed this bar (partial fill, full fill, TIF
    /// expiry/cancellation) — the caller needs the latter to persist the
    /// final status of an order this call removes from the pending set,
    /// since an IOC/FOK/DAY termination can happen without producing a
    /// fill, or after one. Both are in deterministic `(created_time,
    /// order_id)` order.
    pub fn on_bar(
        &mut self,
        symbol: &Symbol,
        bar: &Bar,
        cost: &CostModel,
        rng: &mut BrokerRng,
        now: DateTime<Utc>,
    ) -> (Vec<Fill>, Vec<Order>) {
        if !bar.is_well_formed() {
            warn!(symbol = %symbol, "data gap: malformed bar skipped");
            return (Vec::new(), Vec::new());
        }

        let mut fills = Vec::new();
        let mut updated_orders = Vec::new();
        for order_id in self.sorted_ids_for_symbol(symbol) {
            let mut terminal_after = false;
            let mut touched = false;

            if let Some(order) = self.pending_orders.get_mut(&order_id) {
                if order.time_in_force == TimeInForce::Day
                    && bar.time.date_naive() > order.created_time.date_naive()
                {
                    order.expire(now);
                    terminal_after = true;
                    touched = true;
                } else if order.time_in_force == TimeInForce::Fok {
                    let price = determine_fill_price(order, bar, cost, rng, symbol);
                    let enough_volume = Decimal::from(bar.tick_volume) >= order.remaining_quantity;
                    match price {
                        Some(price) if enough_volume => {
                            if let Some(fill) =
                                execute_fill(order, bar, price, cost, now)
                            {
                                fills.push(fill);
                                touched = true;
                            }
                            terminal_after = order.is_terminal();
                        }
                        _ => {
                            order.cancel(Some("FOK unfillable".into()), now);
                            terminal_after = true;
                            touched = true;
                        }
                    }
                } else if let Some(price) = determine_fill_price(order, bar, cost, rng, symbol) {
                    if let Some(fill) = execute_fill(order, bar, price, cost, now) {
                        fills.push(fill);
                        touched = true;
                    }
                    terminal_after = order.is_terminal();
                }

                if !terminal_after
                    && order.time_in_force == TimeInForce::Ioc
                    && order.is_active()
                {
                    order.cancel(Some("IOC remainder".into()), now);
                    terminal_after = true;
                    touched = true;
                }

                if touched {
                    updated_orders.push(order.clone());
                }
            }

            if terminal_after {
                self.pending_orders.remove(&order_id);
            }
        }
        (fills, updated_orders)
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the fill price for this order against this bar per its order
/// type's matching rule, mutating `order.stop_triggered` when a
/// `STOP_LIMIT` order's stop leg fires. Returns `None` when the order's
/// trigger condition is not met this bar.
fn determine_fill_price(
    order: &mut Order,
    bar: &Bar,
    cost: &CostModel,
    rng: &mut BrokerRng,
    symbol: &Symbol,
) -> Option<Decimal> {
    match order.order_type {
        OrderType::Market => Some(market_price(order.side, bar, cost, rng, symbol)),
        OrderType::Limit => {
            let limit_price = order.limit_price?;
            let touched = match order.side {
                Side::Buy => bar.low <= limit_price,
                Side::Sell => bar.high >= limit_price,
            };
            touched.then_some(limit_price)
        }
        OrderType::Stop => {
            let stop_price = order.stop_price?;
            let touched = match order.side {
                Side::Buy => bar.high >= stop_price,
                Side::Sell => bar.low <= stop_price,
            };
            touched.then(|| market_price(order.side, bar, cost, rng, symbol))
        }
        OrderType::StopLimit => {
            let stop_price = order.stop_price?;
            let limit_price = order.limit_price?;
            if !order.stop_triggered {
                let stop_touched = match order.side {
                    Side::Buy => bar.high >= stop_price,
                    Side::Sell => bar.low <= stop_price,
                };
                if stop_touched {
                    order.stop_triggered = true;
                }
            }
            if !order.stop_triggered {
                return None;
            }
            let limit_touched = match order.side {
                Side::Buy => bar.low <= limit_price,
                Side::Sell => bar.high >= limit_price,
            };
            limit_touched.then_some(limit_price)
        }
    }
}

fn market_price(
    side: Side,
    bar: &Bar,
    cost: &CostModel,
    rng: &mut BrokerRng,
    symbol: &Symbol,
) -> Decimal {
    let slippage = cost.market_slippage(rng, symbol);
    match side {
        Side::Buy => bar.ask + slippage,
        Side::Sell => bar.bid - slippage,
    }
}

/// Applies exactly one fill of `price` to `order`, sized to
/// `min(remaining_quantity, bar.tick_volume)`, and returns the resulting
/// [`Fill`] record (always `Some` — callers only invoke this once a price
/// has already been resolved).
fn execute_fill(
    order: &mut Order,
    bar: &Bar,
    price: Decimal,
    cost: &CostModel,
    now: DateTime<Utc>,
) -> Option<Fill> {
    let fill_volume = order.remaining_quantity.min(Decimal::from(bar.tick_volume));
    if fill_volume <= Decimal::ZERO {
        return None;
    }
    let commission = cost.commission(fill_volume);
    order.apply_fill(price, fill_volume, now);

    let fill = Fill {
        fill_id: FillId::new(FILL_IDS.next()),
        order_id: order.order_id.clone(),
        fill_time: now,
        fill_price: price,
        fill_volume,
        commission,
        is_partial: order.status == OrderStatus::PartialFilled,
        remaining_volume_after: order.remaining_quantity,
        market_price: bar.close,
        bid: bar.bid,
        ask: bar.ask,
        bar_volume: bar.tick_volume,
    };
    debug!(order_id = %fill.order_id, fill_id = %fill.fill_id, price = %price, volume = %fill_volume, "fill emitted");
    Some(fill)
}
