//! Fills: immutable execution records produced by the matching engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{FillId, OrderId};

/// A realized execution of some volume of an order at a specific price.
/// Fills are never modified once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: FillId,
    pub order_id: OrderId,
    pub fill_time: DateTime<Utc>,
    pub fill_price: Decimal,
    pub fill_volume: Decimal,
    pub commission: Decimal,
    pub is_partial: bool,
    pub remaining_volume_after: Decimal,
    pub market_price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub bar_volume: u64,
}
