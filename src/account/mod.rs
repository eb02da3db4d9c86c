//! Account Kernel / Broker Simulator. Owns the money and
//! position state the matching engine's fills mutate: balance, equity,
//! margin, the open-position map, SL/TP monitoring, and realized P&L.
//! Each order that opens exposure creates its own position; fills are never
//! netted across positions, only accumulated within the order that owns
//! them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::BrokerConfig;
use crate::cost::CostModel;
use crate::domain::ids::IdSequence;
use crate::domain::{
    AccountHistory, Fill, Order, OrderId, Position, PositionId, Side, Symbol, Trade, TradeId,
};
use crate::error::BrokerError;
use crate::rng::BrokerRng;

static POSITION_IDS: IdSequence = IdSequence::new("POS");
static TRADE_IDS: IdSequence = IdSequence::new("TRD");

pub struct AccountKernel {
    config: BrokerConfig,
    balance: Decimal,
    margin_used: Decimal,
    positions: HashMap<PositionId, Position>,
    order_to_position: HashMap<OrderId, PositionId>,
    total_commission_paid: Decimal,
    total_realized_pnl: Decimal,
    total_trades: i64,
    peak_equity: Decimal,
}

/// Result of closing a position: the closed [`Position`] and its [`Trade`]
/// row, so the façade can persist both atomically.
pub struct ClosedTrade {
    pub position: Position,
    pub trade: Trade,
    pub balance_after: Decimal,
    pub equity_after: Decimal,
}

impl AccountKernel {
    pub fn new(config: BrokerConfig) -> Self {
        let initial_balance = config.account.initial_balance;
        Self {
            config,
            balance: initial_balance,
            margin_used: Decimal::ZERO,
            positions: HashMap::new(),
            order_to_position: HashMap::new(),
            total_commission_paid: Decimal::ZERO,
            total_realized_pnl: Decimal::ZERO,
            total_trades: 0,
            peak_equity: initial_balance,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn equity(&self) -> Decimal {
        self.balance + self.open_unrealized_pnl()
    }

    pub fn margin_used(&self) -> Decimal {
        self.margin_used
    }

    pub fn free_margin(&self) -> Decimal {
        self.equity() - self.margin_used
    }

    pub fn margin_level(&self) -> Option<Decimal> {
        if self.margin_used > Decimal::ZERO {
            Some(self.equity() / self.margin_used)
        } else {
            None
        }
    }

    fn open_unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.is_open)
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open)
    }

    pub fn position(&self, position_id: &PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.total_realized_pnl
    }

    pub fn total_trades(&self) -> i64 {
        self.total_trades
    }

    pub fn total_commission_paid(&self) -> Decimal {
        self.total_commission_paid
    }

    fn required_margin(&self, symbol: &Symbol, quantity: Decimal, price: Decimal) -> Decimal {
        let multiplier = self.config.symbol_meta(symbol).contract_multiplier;
        quantity * price * multiplier * self.config.risk.margin_rate
    }

    /// Pre-trade checks: volume bounds, the position-count cap, required
    /// margin, and optional stochastic rejection.
    /// `open_and_pending_count` is supplied by the façade (it alone knows
    /// the engine's pending-order count).
    pub fn pre_trade_check(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        reference_price: Decimal,
        open_and_pending_count: usize,
        rng: &mut BrokerRng,
    ) -> Result<(), &'static str> {
        let risk = &self.config.risk;
        if quantity < risk.min_lot || quantity > risk.max_lot {
            return Err("INVALID_VOLUME");
        }
        let steps = (quantity / risk.lot_step).round();
        if (steps * risk.lot_step - quantity).abs() > Decimal::new(1, 8) {
            return Err("INVALID_VOLUME");
        }
        if open_and_pending_count >= risk.max_positions {
            return Err("MAX_POSITIONS");
        }
        let required_margin = self.required_margin(symbol, quantity, reference_price);
        if self.free_margin() - required_margin < Decimal::ZERO {
            return Err("INSUFFICIENT_MARGIN");
        }
        if rng.roll(risk.rejection_probability) {
            return Err("BROKER_REJECT");
        }
        Ok(())
    }

    /// Applies a fill produced by the matching engine: debits commission,
    /// then either folds the fill into the position this order already
    /// opened, or opens a new one. `spread_cost` recorded here is purely
    /// informational (the bid/ask-adjusted fill price already carries the
    /// economic cost of crossing the spread); it is not subtracted again
    /// when the position closes.
    pub fn apply_fill(&mut self, order: &Order, fill: &Fill, cost: &CostModel) -> Position {
        self.balance -= fill.commission;
        self.total_commission_paid += fill.commission;
        let spread_cost =
            cost.effective_spread_cost(fill.bid, fill.ask, fill.fill_volume, fill.bar_volume);

        if let Some(position_id) = self.order_to_position.get(&order.order_id).cloned() {
            if let Some(position) = self.positions.get_mut(&position_id) {
                if position.is_open {
                    position.add_fill(fill.fill_price, fill.fill_volume, fill.commission, spread_cost);
                    self.recompute_margin();
                    return position.clone();
                }
            }
        }

        let position = Position::open(
            PositionId::new(POSITION_IDS.next()),
            order.symbol.clone(),
            order.side,
            fill.fill_volume,
            fill.fill_price,
            fill.commission,
            spread_cost,
            order.stop_loss,
            order.take_profit,
            order.strategy_name.clone(),
            fill.fill_time,
        );
        self.order_to_position
            .insert(order.order_id.clone(), position.position_id.clone());
        self.positions
            .insert(position.position_id.clone(), position.clone());
        self.recompute_margin();
        info!(position_id = %position.position_id, symbol = %position.symbol, "position opened");
        position
    }

    fn recompute_margin(&mut self) {
        self.margin_used = self
            .open_positions()
            .map(|p| p.quantity * p.entry_price * self.config.symbol_meta(&p.symbol).contract_multiplier * self.config.risk.margin_rate)
            .sum();
    }

    /// Marks every open position of `symbol` to the bar's close, then
    /// checks SL/TP with the SL-first-on-overlap policy. Returns the trades produced by any SL/TP closes.
    #[allow(clippy::too_many_arguments)]
    pub fn update_positions_for_bar(
        &mut self,
        symbol: &Symbol,
        bar_close: Decimal,
        bar_low: Decimal,
        bar_high: Decimal,
        cost: &CostModel,
        rng: &mut BrokerRng,
        now: DateTime<Utc>,
    ) -> Vec<ClosedTrade> {
        let multiplier = self.config.symbol_meta(symbol).contract_multiplier;
        let ids: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.is_open && &p.symbol == symbol)
            .map(|p| p.position_id.clone())
            .collect();

        let mut closed = Vec::new();
        for id in ids {
            let exit = {
                let position = match self.positions.get_mut(&id) {
                    Some(p) => p,
                    None => continue,
                };
                position.mark_to_market(bar_close, multiplier);

                match position.side {
                    Side::Buy => {
                        if let Some(sl) = position.stop_loss {
                            if bar_low <= sl {
                                let slippage = cost.sl_slippage(rng, symbol);
                                Some((sl - slippage, "Stop Loss", slippage))
                            } else if let Some(tp) = position.take_profit {
                                if bar_high >= tp {
                                    let slippage = cost.tp_slippage(rng, symbol);
                                    Some((tp + slippage, "Take Profit", slippage))
                                } else {
                                    None
                                }
                            } else {
                                None
                            }
                        } else if let Some(tp) = position.take_profit {
                            if bar_high >= tp {
                                let slippage = cost.tp_slippage(rng, symbol);
                                Some((tp + slippage, "Take Profit", slippage))
                            } else {
                                None
                            }
                        } else {
                            None
                        }
                    }
                    Side::Sell => {
                        if let Some(sl) = position.stop_loss {
                            if bar_high >= sl {
                                let slippage = cost.sl_slippage(rng, symbol);
                                Some((sl + slippage, "Stop Loss", slippage))
                            } else if let Some(tp) = position.take_profit {
                                if bar_low <= tp {
                                    let slippage = cost.tp_slippage(rng, symbol);
                                    Some((tp - slippage, "Take Profit", slippage))
                                } else {
                                    None
                                }
                            } else {
                                None
                            }
                        } else if let Some(tp) = position.take_profit {
                            if bar_low <= tp {
                                let slippage = cost.tp_slippage(rng, symbol);
                                Some((tp - slippage, "Take Profit", slippage))
                            } else {
                                None
                            }
                        } else {
                            None
                        }
                    }
                }
            };

            if let Some((exit_price, reason, slippage)) = exit {
                let point_size = cost.point_size(symbol);
                if let Some(trade) = self.close_position_internal(
                    &id,
                    exit_price,
                    slippage,
                    point_size,
                    reason,
                    cost,
                    now,
                ) {
                    closed.push(trade);
                }
            }
        }
        self.recompute_margin();
        closed
    }

    /// Explicit close requested by the caller.
    pub fn close_position(
        &mut self,
        position_id: &PositionId,
        reason: Option<String>,
        bid: Decimal,
        ask: Decimal,
        cost: &CostModel,
        now: DateTime<Utc>,
    ) -> Result<ClosedTrade, BrokerError> {
        let position = self
            .positions
            .get(position_id)
            .ok_or_else(|| BrokerError::UnknownPosition(position_id.clone()))?;
        if !position.is_open {
            return Err(BrokerError::PositionAlreadyClosed(position_id.clone()));
        }
        let exit_price = match position.side {
            Side::Buy => bid,
            Side::Sell => ask,
        };
        let point_size = cost.point_size(&position.symbol);
        let reason = reason.unwrap_or_else(|| "Manual Close".to_string());
        self.close_position_internal(position_id, exit_price, Decimal::ZERO, point_size, &reason, cost, now)
            .ok_or_else(|| BrokerError::UnknownPosition(position_id.clone()))
    }

    /// Closes a position and reconciles the balance. The entry-side
    /// commission was already debited from `balance` when the opening fill
    /// was applied (`apply_fill`); only the exit-side commission is charged
    /// here, explicitly, mirroring a real broker charging commission per
    /// side. `net_pnl` (stored on the position/Trade for reporting) reflects
    /// both commissions and the swap total, but the actual balance delta
    /// applied here is just `gross_pnl` — the entry commission, exit
    /// commission, and any accrued swap have each already moved `balance`
    /// exactly once, at the moment they occurred.
    #[allow(clippy::too_many_arguments)]
    fn close_position_internal(
        &mut self,
        position_id: &PositionId,
        exit_price: Decimal,
        slippage: Decimal,
        point_size: Decimal,
        reason: &str,
        cost: &CostModel,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let position = self.positions.get_mut(position_id)?;
        let multiplier = self.config.symbol_meta(&position.symbol).contract_multiplier;

        let exit_commission = cost.commission(position.quantity);
        self.balance -= exit_commission;
        self.total_commission_paid += exit_commission;

        let (gross_pnl, net_pnl) = position.close(exit_price, multiplier, exit_commission, reason, now);
        let position_snapshot = position.clone();

        self.balance += gross_pnl;
        self.total_realized_pnl += net_pnl;
        self.total_trades += 1;
        self.peak_equity = self.peak_equity.max(self.equity());
        let (_, drawdown_pct) = self.drawdown();

        info!(position_id = %position_snapshot.position_id, reason, net_pnl = %net_pnl, "position closed");

        let trade = Trade::from_closed_position(
            TradeId::new(TRADE_IDS.next()),
            position_snapshot.position_id.clone(),
            position_snapshot.symbol.clone(),
            position_snapshot.side,
            position_snapshot.open_time,
            now,
            position_snapshot.entry_price,
            exit_price,
            position_snapshot.quantity,
            gross_pnl,
            position_snapshot.total_commission,
            position_snapshot.total_swap,
            position_snapshot.spread_cost,
            slippage,
            net_pnl,
            point_size,
            reason.to_string(),
            self.balance,
            self.equity(),
            drawdown_pct,
            position_snapshot.strategy_name.clone(),
        );

        Some(ClosedTrade {
            position: position_snapshot,
            trade,
            balance_after: self.balance,
            equity_after: self.equity(),
        })
    }

    /// Daily rollover: applies `swap_long`/`swap_short` per lot to every
    /// open position as a balance debit/credit.
    pub fn apply_swap_rollover(&mut self, cost: &CostModel) {
        let ids: Vec<PositionId> = self.positions.keys().cloned().collect();
        for id in ids {
            if let Some(position) = self.positions.get_mut(&id) {
                if !position.is_open {
                    continue;
                }
                let amount = cost.swap_charge(position.side, position.quantity);
                position.accrue_swap(amount);
                self.balance += amount;
            }
        }
    }

    pub fn drawdown(&self) -> (Decimal, Decimal) {
        let equity = self.equity();
        let drawdown_usd = (self.peak_equity - equity).max(Decimal::ZERO);
        let drawdown_pct = if self.peak_equity > Decimal::ZERO {
            drawdown_usd / self.peak_equity * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        (drawdown_usd, drawdown_pct)
    }

    /// Builds a snapshot row reflecting current state; the façade assigns `id` once persisted.
    pub fn snapshot(
        &self,
        timestamp: DateTime<Utc>,
        num_pending_orders: i64,
        daily_pnl: Decimal,
        day_start_balance: Decimal,
    ) -> AccountHistory {
        let (drawdown_usd, drawdown_pct) = self.drawdown();
        let daily_return_pct = if day_start_balance > Decimal::ZERO {
            daily_pnl / day_start_balance * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        AccountHistory {
            id: 0,
            timestamp,
            balance: self.balance,
            equity: self.equity(),
            margin_used: self.margin_used,
            free_margin: self.free_margin(),
            margin_level: self.margin_level(),
            num_positions: self.open_positions().count() as i64,
            num_pending_orders,
            daily_pnl,
            daily_return_pct,
            total_realized_pnl: self.total_realized_pnl,
            total_trades: self.total_trades,
            total_commission_paid: self.total_commission_paid,
            drawdown_usd,
            drawdown_pct,
        }
    }
}
