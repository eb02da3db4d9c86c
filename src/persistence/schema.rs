//! SQLite DDL. Every table after `orders` carries a foreign key
//! back to it (directly or via `positions`), so `PRAGMA foreign_keys = ON`
//! plus `ON DELETE CASCADE` keeps the event log referentially intact without
//! the broker having to cascade deletes itself.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id            TEXT PRIMARY KEY,
    symbol              TEXT NOT NULL,
    order_type          TEXT NOT NULL,
    side                TEXT NOT NULL,
    quantity            TEXT NOT NULL,
    limit_price         TEXT,
    stop_price          TEXT,
    time_in_force       TEXT NOT NULL,
    created_time        TEXT NOT NULL,
    expires_at          TEXT,
    stop_loss           TEXT,
    take_profit         TEXT,
    strategy_name       TEXT,
    filled_quantity     TEXT NOT NULL,
    remaining_quantity  TEXT NOT NULL,
    avg_fill_price      TEXT NOT NULL,
    status              TEXT NOT NULL,
    filled_time         TEXT,
    cancelled_time      TEXT,
    rejection_reason    TEXT,
    cancelled_reason    TEXT,
    stop_triggered      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders(symbol);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
CREATE INDEX IF NOT EXISTS idx_orders_created_time ON orders(created_time);

CREATE TABLE IF NOT EXISTS fills (
    fill_id                 TEXT PRIMARY KEY,
    order_id                TEXT NOT NULL REFERENCES orders(order_id) ON DELETE CASCADE,
    fill_time               TEXT NOT NULL,
    fill_price              TEXT NOT NULL,
    fill_volume             TEXT NOT NULL,
    commission              TEXT NOT NULL,
    is_partial              INTEGER NOT NULL,
    remaining_volume_after  TEXT NOT NULL,
    market_price            TEXT NOT NULL,
    bid                     TEXT NOT NULL,
    ask                     TEXT NOT NULL,
    bar_volume              INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fills_order_id ON fills(order_id);
CREATE INDEX IF NOT EXISTS idx_fills_fill_time ON fills(fill_time);

CREATE TABLE IF NOT EXISTS positions (
    position_id       TEXT PRIMARY KEY,
    symbol            TEXT NOT NULL,
    side              TEXT NOT NULL,
    quantity          TEXT NOT NULL,
    entry_price       TEXT NOT NULL,
    current_price     TEXT NOT NULL,
    stop_loss         TEXT,
    take_profit       TEXT,
    is_open           INTEGER NOT NULL,
    unrealized_pnl    TEXT NOT NULL,
    realized_pnl      TEXT NOT NULL,
    total_commission  TEXT NOT NULL,
    total_swap        TEXT NOT NULL,
    spread_cost       TEXT NOT NULL,
    open_time         TEXT NOT NULL,
    close_time        TEXT,
    exit_reason       TEXT,
    strategy_name     TEXT
);

CREATE INDEX IF NOT EXISTS idx_positions_symbol ON positions(symbol);
CREATE INDEX IF NOT EXISTS idx_positions_is_open ON positions(is_open);

CREATE TABLE IF NOT EXISTS trades (
    trade_id        TEXT PRIMARY KEY,
    position_id     TEXT NOT NULL REFERENCES positions(position_id) ON DELETE CASCADE,
    symbol          TEXT NOT NULL,
    direction       TEXT NOT NULL,
    entry_time      TEXT NOT NULL,
    exit_time       TEXT NOT NULL,
    entry_price     TEXT NOT NULL,
    exit_price      TEXT NOT NULL,
    lot_size        TEXT NOT NULL,
    gross_pnl       TEXT NOT NULL,
    commission      TEXT NOT NULL,
    swap            TEXT NOT NULL,
    spread_cost     TEXT NOT NULL,
    slippage        TEXT NOT NULL,
    net_pnl         TEXT NOT NULL,
    pips            TEXT NOT NULL,
    duration_hours  TEXT NOT NULL,
    exit_reason     TEXT NOT NULL,
    balance_after   TEXT NOT NULL,
    equity_after    TEXT NOT NULL,
    drawdown_pct    TEXT NOT NULL,
    strategy_name   TEXT
);

CREATE INDEX IF NOT EXISTS idx_trades_position_id ON trades(position_id);
CREATE INDEX IF NOT EXISTS idx_trades_exit_time ON trades(exit_time);

CREATE TABLE IF NOT EXISTS account_history (
    id                     INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp              TEXT NOT NULL,
    balance                TEXT NOT NULL,
    equity                 TEXT NOT NULL,
    margin_used            TEXT NOT NULL,
    free_margin            TEXT NOT NULL,
    margin_level           TEXT,
    num_positions          INTEGER NOT NULL,
    num_pending_orders     INTEGER NOT NULL,
    daily_pnl              TEXT NOT NULL,
    daily_return_pct       TEXT NOT NULL,
    total_realized_pnl     TEXT NOT NULL,
    total_trades           INTEGER NOT NULL,
    total_commission_paid  TEXT NOT NULL,
    drawdown_usd           TEXT NOT NULL,
    drawdown_pct           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_account_history_timestamp ON account_history(timestamp);
"#;
