//! Periodic account equity-curve snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHistory {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
    pub free_margin: Decimal,
    pub margin_level: Option<Decimal>,
    pub num_positions: i64,
    pub num_pending_orders: i64,
    pub daily_pnl: Decimal,
    pub daily_return_pct: Decimal,
    pub total_realized_pnl: Decimal,
    pub total_trades: i64,
    pub total_commission_paid: Decimal,
    pub drawdown_usd: Decimal,
    pub drawdown_pct: Decimal,
}
