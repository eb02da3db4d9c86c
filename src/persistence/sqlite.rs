//! SQLite-backed durable store: a `Mutex<Connection>`, WAL journal mode, and
//! `CREATE TABLE IF NOT EXISTS` schema bootstrap run once at construction,
//! covering the full order/fill/position/trade/snapshot schema with
//! `foreign_keys = ON` so fills and trades cascade-delete with their parent
//! order or position.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::domain::{
    AccountHistory, Fill, FillId, Order, OrderId, OrderStatus, OrderType, Position, PositionId,
    Side, Symbol, TimeInForce, Trade, TradeId,
};
use crate::error::PersistenceError;

use super::PersistenceStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).context("opening sqlite database")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().context("opening in-memory sqlite database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL journal mode")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enabling foreign key enforcement")?;
        conn.execute_batch(super::schema::SCHEMA)
            .context("running schema migration")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn dec_opt(d: Option<Decimal>) -> Option<String> {
    d.map(|v| v.to_string())
}

fn parse_dec(s: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("parsing decimal column value {s:?}"))
}

fn parse_dec_opt(s: Option<String>) -> anyhow::Result<Option<Decimal>> {
    s.map(|s| parse_dec(&s)).transpose()
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("parsing timestamp column value {s:?}"))?
        .with_timezone(&Utc))
}

fn parse_ts_opt(s: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s)).transpose()
}

fn order_type_str(t: OrderType) -> &'static str {
    match t {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::Stop => "STOP",
        OrderType::StopLimit => "STOP_LIMIT",
    }
}

fn parse_order_type(s: &str) -> anyhow::Result<OrderType> {
    Ok(match s {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        "STOP" => OrderType::Stop,
        "STOP_LIMIT" => OrderType::StopLimit,
        other => anyhow::bail!("unknown order_type {other:?}"),
    })
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_side(s: &str) -> anyhow::Result<Side> {
    Ok(match s {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => anyhow::bail!("unknown side {other:?}"),
    })
}

fn tif_str(t: TimeInForce) -> &'static str {
    match t {
        TimeInForce::Gtc => "GTC",
        TimeInForce::Ioc => "IOC",
        TimeInForce::Fok => "FOK",
        TimeInForce::Day => "DAY",
    }
}

fn parse_tif(s: &str) -> anyhow::Result<TimeInForce> {
    Ok(match s {
        "GTC" => TimeInForce::Gtc,
        "IOC" => TimeInForce::Ioc,
        "FOK" => TimeInForce::Fok,
        "DAY" => TimeInForce::Day,
        other => anyhow::bail!("unknown time_in_force {other:?}"),
    })
}

fn status_str(s: OrderStatus) -> &'static str {
    match s {
        OrderStatus::Pending => "PENDING",
        OrderStatus::PartialFilled => "PARTIAL_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled => "CANCELLED",
        OrderStatus::Rejected => "REJECTED",
        OrderStatus::Expired => "EXPIRED",
    }
}

fn parse_status(s: &str) -> anyhow::Result<OrderStatus> {
    Ok(match s {
        "PENDING" => OrderStatus::Pending,
        "PARTIAL_FILLED" => OrderStatus::PartialFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        other => anyhow::bail!("unknown status {other:?}"),
    })
}

fn row_to_order(row: &rusqlite::Row) -> rusqlite::Result<anyhow::Result<Order>> {
    let build = || -> anyhow::Result<Order> {
        Ok(Order {
            order_id: OrderId::new(row.get::<_, String>(0)?),
            symbol: Symbol::new(row.get::<_, String>(1)?),
            order_type: parse_order_type(&row.get::<_, String>(2)?)?,
            side: parse_side(&row.get::<_, String>(3)?)?,
            quantity: parse_dec(&row.get::<_, String>(4)?)?,
            limit_price: parse_dec_opt(row.get::<_, Option<String>>(5)?)?,
            stop_price: parse_dec_opt(row.get::<_, Option<String>>(6)?)?,
            time_in_force: parse_tif(&row.get::<_, String>(7)?)?,
            created_time: parse_ts(&row.get::<_, String>(8)?)?,
            expires_at: parse_ts_opt(row.get::<_, Option<String>>(9)?)?,
            stop_loss: parse_dec_opt(row.get::<_, Option<String>>(10)?)?,
            take_profit: parse_dec_opt(row.get::<_, Option<String>>(11)?)?,
            strategy_name: row.get::<_, Option<String>>(12)?,
            filled_quantity: parse_dec(&row.get::<_, String>(13)?)?,
            remaining_quantity: parse_dec(&row.get::<_, String>(14)?)?,
            avg_fill_price: parse_dec(&row.get::<_, String>(15)?)?,
            status: parse_status(&row.get::<_, String>(16)?)?,
            filled_time: parse_ts_opt(row.get::<_, Option<String>>(17)?)?,
            cancelled_time: parse_ts_opt(row.get::<_, Option<String>>(18)?)?,
            rejection_reason: row.get::<_, Option<String>>(19)?,
            cancelled_reason: row.get::<_, Option<String>>(20)?,
            stop_triggered: row.get::<_, i64>(21)? != 0,
        })
    };
    Ok(build())
}

const ORDER_COLUMNS: &str = "order_id, symbol, order_type, side, quantity, limit_price, \
    stop_price, time_in_force, created_time, expires_at, stop_loss, take_profit, \
    strategy_name, filled_quantity, remaining_quantity, avg_fill_price, status, \
    filled_time, cancelled_time, rejection_reason, cancelled_reason, stop_triggered";

impl PersistenceStore for SqliteStore {
    fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO orders ({ORDER_COLUMNS}) VALUES \
                (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)"
            ),
            params![
                order.order_id.as_str(),
                order.symbol.as_str(),
                order_type_str(order.order_type),
                side_str(order.side),
                order.quantity.to_string(),
                dec_opt(order.limit_price),
                dec_opt(order.stop_price),
                tif_str(order.time_in_force),
                ts(order.created_time),
                order.expires_at.map(ts),
                dec_opt(order.stop_loss),
                dec_opt(order.take_profit),
                order.strategy_name,
                order.filled_quantity.to_string(),
                order.remaining_quantity.to_string(),
                order.avg_fill_price.to_string(),
                status_str(order.status),
                order.filled_time.map(ts),
                order.cancelled_time.map(ts),
                order.rejection_reason,
                order.cancelled_reason,
                order.stop_triggered as i64,
            ],
        )
        .context("inserting order")?;
        Ok(())
    }

    fn update_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.save_order(order)
    }

    fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let result = conn
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?1"),
                params![order_id.as_str()],
                row_to_order,
            )
            .optional()
            .context("loading order")?;
        match result {
            None => Ok(None),
            Some(built) => Ok(Some(built.context("decoding order row")?)),
        }
    }

    fn load_orders(&self) -> Result<Vec<Order>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_time, order_id"
            ))
            .context("preparing order listing query")?;
        let rows = stmt
            .query_map([], row_to_order)
            .context("listing orders")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading order row")?.context("decoding order row")?);
        }
        Ok(out)
    }

    fn save_fill(&self, fill: &Fill) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO fills (fill_id, order_id, fill_time, fill_price, \
             fill_volume, commission, is_partial, remaining_volume_after, market_price, \
             bid, ask, bar_volume) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                fill.fill_id.as_str(),
                fill.order_id.as_str(),
                ts(fill.fill_time),
                fill.fill_price.to_string(),
                fill.fill_volume.to_string(),
                fill.commission.to_string(),
                fill.is_partial as i64,
                fill.remaining_volume_after.to_string(),
                fill.market_price.to_string(),
                fill.bid.to_string(),
                fill.ask.to_string(),
                fill.bar_volume as i64,
            ],
        )
        .context("inserting fill")?;
        Ok(())
    }

    fn load_fills_for_order(&self, order_id: &OrderId) -> Result<Vec<Fill>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT fill_id, order_id, fill_time, fill_price, fill_volume, commission, \
                 is_partial, remaining_volume_after, market_price, bid, ask, bar_volume \
                 FROM fills WHERE order_id = ?1 ORDER BY fill_time",
            )
            .context("preparing fill listing query")?;
        let rows = stmt
            .query_map(params![order_id.as_str()], |row| {
                let build = || -> anyhow::Result<Fill> {
                    Ok(Fill {
                        fill_id: FillId::new(row.get::<_, String>(0)?),
                        order_id: OrderId::new(row.get::<_, String>(1)?),
                        fill_time: parse_ts(&row.get::<_, String>(2)?)?,
                        fill_price: parse_dec(&row.get::<_, String>(3)?)?,
                        fill_volume: parse_dec(&row.get::<_, String>(4)?)?,
                        commission: parse_dec(&row.get::<_, String>(5)?)?,
                        is_partial: row.get::<_, i64>(6)? != 0,
                        remaining_volume_after: parse_dec(&row.get::<_, String>(7)?)?,
                        market_price: parse_dec(&row.get::<_, String>(8)?)?,
                        bid: parse_dec(&row.get::<_, String>(9)?)?,
                        ask: parse_dec(&row.get::<_, String>(10)?)?,
                        bar_volume: row.get::<_, i64>(11)? as u64,
                    })
                };
                Ok(build())
            })
            .context("listing fills")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading fill row")?.context("decoding fill row")?);
        }
        Ok(out)
    }

    fn save_position(&self, position: &Position) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO positions (position_id, symbol, side, quantity, \
             entry_price, current_price, stop_loss, take_profit, is_open, unrealized_pnl, \
             realized_pnl, total_commission, total_swap, spread_cost, open_time, close_time, \
             exit_reason, strategy_name) VALUES \
             (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                position.position_id.as_str(),
                position.symbol.as_str(),
                side_str(position.side),
                position.quantity.to_string(),
                position.entry_price.to_string(),
                position.current_price.to_string(),
                dec_opt(position.stop_loss),
                dec_opt(position.take_profit),
                position.is_open as i64,
                position.unrealized_pnl.to_string(),
                position.realized_pnl.to_string(),
                position.total_commission.to_string(),
                position.total_swap.to_string(),
                position.spread_cost.to_string(),
                ts(position.open_time),
                position.close_time.map(ts),
                position.exit_reason,
                position.strategy_name,
            ],
        )
        .context("inserting position")?;
        Ok(())
    }

    fn update_position(&self, position: &Position) -> Result<(), PersistenceError> {
        self.save_position(position)
    }

    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        self.load_positions_where("1=1")
    }

    fn load_open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        self.load_positions_where("is_open = 1")
    }

    fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO trades (trade_id, position_id, symbol, direction, \
             entry_time, exit_time, entry_price, exit_price, lot_size, gross_pnl, commission, \
             swap, spread_cost, slippage, net_pnl, pips, duration_hours, exit_reason, \
             balance_after, equity_after, drawdown_pct, strategy_name) VALUES \
             (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
            params![
                trade.trade_id.as_str(),
                trade.position_id.as_str(),
                trade.symbol.as_str(),
                side_str(trade.direction),
                ts(trade.entry_time),
                ts(trade.exit_time),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                trade.lot_size.to_string(),
                trade.gross_pnl.to_string(),
                trade.commission.to_string(),
                trade.swap.to_string(),
                trade.spread_cost.to_string(),
                trade.slippage.to_string(),
                trade.net_pnl.to_string(),
                trade.pips.to_string(),
                trade.duration_hours.to_string(),
                trade.exit_reason,
                trade.balance_after.to_string(),
                trade.equity_after.to_string(),
                trade.drawdown_pct.to_string(),
                trade.strategy_name,
            ],
        )
        .context("inserting trade")?;
        Ok(())
    }

    fn load_trades(&self) -> Result<Vec<Trade>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT trade_id, position_id, symbol, direction, entry_time, exit_time, \
                 entry_price, exit_price, lot_size, gross_pnl, commission, swap, spread_cost, \
                 slippage, net_pnl, pips, duration_hours, exit_reason, balance_after, \
                 equity_after, drawdown_pct, strategy_name FROM trades ORDER BY exit_time",
            )
            .context("preparing trade listing query")?;
        let rows = stmt
            .query_map([], |row| {
                let build = || -> anyhow::Result<Trade> {
                    Ok(Trade {
                        trade_id: TradeId::new(row.get::<_, String>(0)?),
                        position_id: PositionId::new(row.get::<_, String>(1)?),
                        symbol: Symbol::new(row.get::<_, String>(2)?),
                        direction: parse_side(&row.get::<_, String>(3)?)?,
                        entry_time: parse_ts(&row.get::<_, String>(4)?)?,
                        exit_time: parse_ts(&row.get::<_, String>(5)?)?,
                        entry_price: parse_dec(&row.get::<_, String>(6)?)?,
                        exit_price: parse_dec(&row.get::<_, String>(7)?)?,
                        lot_size: parse_dec(&row.get::<_, String>(8)?)?,
                        gross_pnl: parse_dec(&row.get::<_, String>(9)?)?,
                        commission: parse_dec(&row.get::<_, String>(10)?)?,
                        swap: parse_dec(&row.get::<_, String>(11)?)?,
                        spread_cost: parse_dec(&row.get::<_, String>(12)?)?,
                        slippage: parse_dec(&row.get::<_, String>(13)?)?,
                        net_pnl: parse_dec(&row.get::<_, String>(14)?)?,
                        pips: parse_dec(&row.get::<_, String>(15)?)?,
                        duration_hours: parse_dec(&row.get::<_, String>(16)?)?,
                        exit_reason: row.get::<_, String>(17)?,
                        balance_after: parse_dec(&row.get::<_, String>(18)?)?,
                        equity_after: parse_dec(&row.get::<_, String>(19)?)?,
                        drawdown_pct: parse_dec(&row.get::<_, String>(20)?)?,
                        strategy_name: row.get::<_, Option<String>>(21)?,
                    })
                };
                Ok(build())
            })
            .context("listing trades")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading trade row")?.context("decoding trade row")?);
        }
        Ok(out)
    }

    fn save_account_snapshot(&self, snapshot: &AccountHistory) -> Result<i64, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        conn.execute(
            "INSERT INTO account_history (timestamp, balance, equity, margin_used, \
             free_margin, margin_level, num_positions, num_pending_orders, daily_pnl, \
             daily_return_pct, total_realized_pnl, total_trades, total_commission_paid, \
             drawdown_usd, drawdown_pct) VALUES \
             (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                ts(snapshot.timestamp),
                snapshot.balance.to_string(),
                snapshot.equity.to_string(),
                snapshot.margin_used.to_string(),
                snapshot.free_margin.to_string(),
                dec_opt(snapshot.margin_level),
                snapshot.num_positions,
                snapshot.num_pending_orders,
                snapshot.daily_pnl.to_string(),
                snapshot.daily_return_pct.to_string(),
                snapshot.total_realized_pnl.to_string(),
                snapshot.total_trades,
                snapshot.total_commission_paid.to_string(),
                snapshot.drawdown_usd.to_string(),
                snapshot.drawdown_pct.to_string(),
            ],
        )
        .context("inserting account snapshot")?;
        Ok(conn.last_insert_rowid())
    }

    fn load_account_history(&self, limit: Option<i64>) -> Result<Vec<AccountHistory>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let query = match limit {
            Some(_) => {
                "SELECT id, timestamp, balance, equity, margin_used, free_margin, margin_level, \
                 num_positions, num_pending_orders, daily_pnl, daily_return_pct, \
                 total_realized_pnl, total_trades, total_commission_paid, drawdown_usd, \
                 drawdown_pct FROM account_history ORDER BY id DESC LIMIT ?1"
            }
            None => {
                "SELECT id, timestamp, balance, equity, margin_used, free_margin, margin_level, \
                 num_positions, num_pending_orders, daily_pnl, daily_return_pct, \
                 total_realized_pnl, total_trades, total_commission_paid, drawdown_usd, \
                 drawdown_pct FROM account_history ORDER BY id DESC"
            }
        };
        let mut stmt = conn.prepare(query).context("preparing snapshot listing query")?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<anyhow::Result<AccountHistory>> {
            let build = || -> anyhow::Result<AccountHistory> {
                Ok(AccountHistory {
                    id: row.get(0)?,
                    timestamp: parse_ts(&row.get::<_, String>(1)?)?,
                    balance: parse_dec(&row.get::<_, String>(2)?)?,
                    equity: parse_dec(&row.get::<_, String>(3)?)?,
                    margin_used: parse_dec(&row.get::<_, String>(4)?)?,
                    free_margin: parse_dec(&row.get::<_, String>(5)?)?,
                    margin_level: parse_dec_opt(row.get::<_, Option<String>>(6)?)?,
                    num_positions: row.get(7)?,
                    num_pending_orders: row.get(8)?,
                    daily_pnl: parse_dec(&row.get::<_, String>(9)?)?,
                    daily_return_pct: parse_dec(&row.get::<_, String>(10)?)?,
                    total_realized_pnl: parse_dec(&row.get::<_, String>(11)?)?,
                    total_trades: row.get(12)?,
                    total_commission_paid: parse_dec(&row.get::<_, String>(13)?)?,
                    drawdown_usd: parse_dec(&row.get::<_, String>(14)?)?,
                    drawdown_pct: parse_dec(&row.get::<_, String>(15)?)?,
                })
            };
            Ok(build())
        };
        let rows = match limit {
            Some(limit) => stmt.query_map(params![limit], map_row),
            None => stmt.query_map([], map_row),
        }
        .context("listing account history")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading snapshot row")?.context("decoding snapshot row")?);
        }
        out.reverse();
        Ok(out)
    }
}

impl SqliteStore {
    fn load_positions_where(&self, predicate: &str) -> Result<Vec<Position>, PersistenceError> {
        let conn = self.conn.lock().expect("sqlite mutex poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT position_id, symbol, side, quantity, entry_price, current_price, \
                 stop_loss, take_profit, is_open, unrealized_pnl, realized_pnl, \
                 total_commission, total_swap, spread_cost, open_time, close_time, \
                 exit_reason, strategy_name FROM positions WHERE {predicate} \
                 ORDER BY open_time, position_id"
            ))
            .context("preparing position listing query")?;
        let rows = stmt
            .query_map([], |row| {
                let build = || -> anyhow::Result<Position> {
                    Ok(Position {
                        position_id: PositionId::new(row.get::<_, String>(0)?),
                        symbol: Symbol::new(row.get::<_, String>(1)?),
                        side: parse_side(&row.get::<_, String>(2)?)?,
                        quantity: parse_dec(&row.get::<_, String>(3)?)?,
                        entry_price: parse_dec(&row.get::<_, String>(4)?)?,
                        current_price: parse_dec(&row.get::<_, String>(5)?)?,
                        stop_loss: parse_dec_opt(row.get::<_, Option<String>>(6)?)?,
                        take_profit: parse_dec_opt(row.get::<_, Option<String>>(7)?)?,
                        is_open: row.get::<_, i64>(8)? != 0,
                        unrealized_pnl: parse_dec(&row.get::<_, String>(9)?)?,
                        realized_pnl: parse_dec(&row.get::<_, String>(10)?)?,
                        total_commission: parse_dec(&row.get::<_, String>(11)?)?,
                        total_swap: parse_dec(&row.get::<_, String>(12)?)?,
                        spread_cost: parse_dec(&row.get::<_, String>(13)?)?,
                        open_time: parse_ts(&row.get::<_, String>(14)?)?,
                        close_time: parse_ts_opt(row.get::<_, Option<String>>(15)?)?,
                        exit_reason: row.get::<_, Option<String>>(16)?,
                        strategy_name: row.get::<_, Option<String>>(17)?,
                    })
                };
                Ok(build())
            })
            .context("listing positions")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("reading position row")?.context("decoding position row")?);
        }
        Ok(out)
    }
}
