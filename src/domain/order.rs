//! Order lifecycle: types, time-in-force, status state machine and the
//! mutable accounting fields an order accrues as fills arrive.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

use super::ids::OrderId;
use super::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// A resting or working order. `filled_quantity + remaining_quantity ==
/// quantity` holds after every mutation; the two
/// fields are only ever updated together by [`Order::apply_fill`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub order_type: OrderType,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub created_time: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub strategy_name: Option<String>,

    pub filled_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub status: OrderStatus,
    pub filled_time: Option<DateTime<Utc>>,
    pub cancelled_time: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub cancelled_reason: Option<String>,

    /// Set once the stop leg of a STOP_LIMIT order has triggered; from then
    /// on the order matches as a plain LIMIT order.
    pub stop_triggered: bool,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        order_type: OrderType,
        side: Side,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        time_in_force: TimeInForce,
        expires_at: Option<DateTime<Utc>>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        strategy_name: Option<String>,
        created_time: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            symbol,
            order_type,
            side,
            quantity,
            limit_price,
            stop_price,
            time_in_force,
            created_time,
            expires_at,
            stop_loss,
            take_profit,
            strategy_name,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: quantity,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::Pending,
            filled_time: None,
            cancelled_time: None,
            rejection_reason: None,
            cancelled_reason: None,
            stop_triggered: false,
        }
    }

    /// Validates a not-yet-submitted order's required fields for its type.
    pub fn validate(
        order_type: OrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        if quantity <= Decimal::ZERO {
            return Err(BrokerError::InvalidParameter(
                "quantity must be positive".into(),
            ));
        }
        match order_type {
            OrderType::Limit => {
                if limit_price.map_or(true, |p| p <= Decimal::ZERO) {
                    return Err(BrokerError::InvalidParameter(
                        "LIMIT order requires a positive limit_price".into(),
                    ));
                }
            }
            OrderType::Stop => {
                if stop_price.map_or(true, |p| p <= Decimal::ZERO) {
                    return Err(BrokerError::InvalidParameter(
                        "STOP order requires a positive stop_price".into(),
                    ));
                }
            }
            OrderType::StopLimit => {
                if limit_price.map_or(true, |p| p <= Decimal::ZERO)
                    || stop_price.map_or(true, |p| p <= Decimal::ZERO)
                {
                    return Err(BrokerError::InvalidParameter(
                        "STOP_LIMIT order requires positive limit_price and stop_price".into(),
                    ));
                }
            }
            OrderType::Market => {}
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Applies one fill's worth of quantity to this order, recomputing the
    /// volume-weighted `avg_fill_price` and the derived `remaining_quantity`
    /// in the same step.
    pub fn apply_fill(&mut self, fill_price: Decimal, fill_qty: Decimal, now: DateTime<Utc>) {
        let prior_value = self.avg_fill_price * self.filled_quantity;
        let new_value = fill_price * fill_qty;
        let new_filled = self.filled_quantity + fill_qty;

        self.avg_fill_price = if new_filled > Decimal::ZERO {
            (prior_value + new_value) / new_filled
        } else {
            fill_price
        };
        self.filled_quantity = new_filled;
        self.remaining_quantity = self.quantity - self.filled_quantity;

        self.status = if self.remaining_quantity <= Decimal::ZERO {
            self.remaining_quantity = Decimal::ZERO;
            self.filled_time = Some(now);
            OrderStatus::Filled
        } else {
            OrderStatus::PartialFilled
        };
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) {
        self.status = OrderStatus::Cancelled;
        self.cancelled_time = Some(now);
        self.cancelled_reason = reason;
    }

    pub fn reject(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = OrderStatus::Rejected;
        self.cancelled_time = Some(now);
        self.rejection_reason = Some(reason);
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = OrderStatus::Expired;
        self.cancelled_time = Some(now);
    }

    /// Applies a modify request: only for non-terminal
    /// orders, `new_quantity` must be >= already-filled quantity.
    pub fn modify(
        &mut self,
        new_quantity: Option<Decimal>,
        new_limit_price: Option<Decimal>,
        new_stop_price: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        if self.is_terminal() {
            return Err(BrokerError::TerminalOrder(self.order_id.clone()));
        }
        if let Some(q) = new_quantity {
            if q < self.filled_quantity {
                return Err(BrokerError::InvalidParameter(
                    "new_quantity cannot be less than filled_quantity".into(),
                ));
            }
            self.quantity = q;
            self.remaining_quantity = q - self.filled_quantity;
        }
        if let Some(lp) = new_limit_price {
            self.limit_price = Some(lp);
        }
        if let Some(sp) = new_stop_price {
            self.stop_price = Some(sp);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order() -> Order {
        Order::new(
            OrderId::new("ORD-1"),
            Symbol::new("EURUSD"),
            OrderType::Limit,
            Side::Buy,
            dec!(10),
            Some(dec!(1.1000)),
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
    fn fill_quantity_invariant_holds() {
        let mut o = new_order();
        o.apply_fill(dec!(1.1000), dec!(4), Utc::now());
        assert_eq!(o.filled_quantity + o.remaining_quantity, o.quantity);
        assert_eq!(o.status, OrderStatus::PartialFilled);

        o.apply_fill(dec!(1.1010), dec!(6), Utc::now());
        assert_eq!(o.filled_quantity + o.remaining_quantity, o.quantity);
        assert_eq!(o.status, OrderStatus::Filled);
    }

    #[test]
    fn avg_fill_price_is_volume_weighted() {
        let mut o = new_order();
        o.apply_fill(dec!(1.1000), dec!(4), Utc::now());
        o.apply_fill(dec!(1.2000), dec!(6), Utc::now());
        let expected = (dec!(1.1000) * dec!(4) + dec!(1.2000) * dec!(6)) / dec!(10);
        assert_eq!(o.avg_fill_price, expected);
    }

    #[test]
    fn modify_rejects_quantity_below_filled() {
        let mut o = new_order();
        o.apply_fill(dec!(1.1000), dec!(4), Utc::now());
        let result = o.modify(Some(dec!(2)), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn terminal_order_cannot_be_modified() {
        let mut o = new_order();
        o.cancel(None, Utc::now());
        assert!(o.modify(Some(dec!(5)), None, None).is_err());
    }

    #[test]
    fn validate_requires_limit_price_for_limit_orders() {
        assert!(Order::validate(OrderType::Limit, dec!(1), None, None).is_err());
        assert!(Order::validate(OrderType::Limit, dec!(1), Some(dec!(1.1)), None).is_ok());
    }

    #[test]
    fn validate_requires_both_prices_for_stop_limit() {
        assert!(Order::validate(OrderType::StopLimit, dec!(1), Some(dec!(1.1)), None).is_err());
        assert!(Order::validate(
            OrderType::StopLimit,
            dec!(1),
            Some(dec!(1.1)),
            Some(dec!(1.05))
        )
        .is_ok());
    }
}
