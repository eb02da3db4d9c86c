//! Open/closed position bookkeeping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::PositionId;
use super::order::Side;
use super::symbol::Symbol;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub is_open: bool,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub total_commission: Decimal,
    pub total_swap: Decimal,
    pub spread_cost: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub strategy_name: Option<String>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        position_id: PositionId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        entry_price: Decimal,
        commission: Decimal,
        spread_cost: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        strategy_name: Option<String>,
        open_time: DateTime<Utc>,
    ) -> Self {
        Self {
            position_id,
            symbol,
            side,
            quantity,
            entry_price,
            current_price: entry_price,
            stop_loss,
            take_profit,
            is_open: true,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            total_commission: commission,
            total_swap: Decimal::ZERO,
            spread_cost,
            open_time,
            close_time: None,
            exit_reason: None,
            strategy_name,
        }
    }

    /// `(current - entry) * qty * multiplier`, sign-flipped for SHORT.
    pub fn gross_pnl_at(&self, price: Decimal, multiplier: Decimal) -> Decimal {
        let diff = match self.side {
            Side::Buy => price - self.entry_price,
            Side::Sell => self.entry_price - price,
        };
        diff * self.quantity * multiplier
    }

    pub fn mark_to_market(&mut self, current_price: Decimal, multiplier: Decimal) {
        self.current_price = current_price;
        self.unrealized_pnl = self.gross_pnl_at(current_price, multiplier);
    }

    pub fn accrue_swap(&mut self, amount: Decimal) {
        self.total_swap += amount;
    }

    /// Folds another fill of the same order into this position: the
    /// quantity-weighted entry price is recomputed over the combined
    /// volume, and the fill's commission/spread cost are added to the
    /// running totals.
    pub fn add_fill(
        &mut self,
        fill_price: Decimal,
        fill_volume: Decimal,
        commission: Decimal,
        spread_cost: Decimal,
    ) {
        let prior_notional = self.entry_price * self.quantity;
        let new_notional = fill_price * fill_volume;
        let new_quantity = self.quantity + fill_volume;
        self.entry_price = if new_quantity > Decimal::ZERO {
            (prior_notional + new_notional) / new_quantity
        } else {
            fill_price
        };
        self.quantity = new_quantity;
        self.total_commission += commission;
        self.spread_cost += spread_cost;
    }

    /// Closes the position, folding in the exit-side commission and
    /// computing the realized P&L: `net_pnl = gross_pnl - total_commission +
    /// total_swap`. `entry_price`/`exit_price` are the actual bid/ask- and
    /// slippage-adjusted execution prices, so `gross_pnl` already carries
    /// the spread and slippage cost of both legs; `spread_cost` is tracked
    /// separately only for reporting and is not subtracted again here.
    /// `total_swap` is a signed balance delta (negative is a cost), added
    /// rather than subtracted. Returns `(gross_pnl, net_pnl)` so the caller
    /// can write a Trade row.
    pub fn close(
        &mut self,
        exit_price: Decimal,
        multiplier: Decimal,
        exit_commission: Decimal,
        reason: impl Into<String>,
        close_time: DateTime<Utc>,
    ) -> (Decimal, Decimal) {
        let gross_pnl = self.gross_pnl_at(exit_price, multiplier);
        self.total_commission += exit_commission;
        let net_pnl = gross_pnl - self.total_commission + self.total_swap;

        self.current_price = exit_price;
        self.realized_pnl = net_pnl;
        self.unrealized_pnl = Decimal::ZERO;
        self.is_open = false;
        self.close_time = Some(close_time);
        self.exit_reason = Some(reason.into());

        (gross_pnl, net_pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn open_long() -> Position {
        Position::open(
            PositionId::new("POS-1"),
            Symbol::new("EURUSD"),
            Side::Buy,
            dec!(1.0),
            dec!(1.1000),
            dec!(2.0),
            dec!(0.5),
            Some(dec!(1.0950)),
            Some(dec!(1.1100)),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn long_unrealized_pnl_tracks_price() {
        let mut p = open_long();
        p.mark_to_market(dec!(1.1050), dec!(100_000));
        assert_eq!(p.unrealized_pnl, dec!(500.00000));
    }

    #[test]
    fn short_pnl_is_sign_flipped() {
        let mut p = open_long();
        p.side = Side::Sell;
        p.mark_to_market(dec!(1.1050), dec!(100_000));
        assert_eq!(p.unrealized_pnl, dec!(-500.00000));
    }

    #[test]
    fn close_computes_net_pnl_per_contract() {
        let mut p = open_long();
        let (gross, net) = p.close(dec!(1.1100), dec!(100_000), dec!(2.0), "Take Profit", Utc::now());
        assert_eq!(gross, dec!(1000.00000));
        // net = gross - total_commission(entry 2.0 + exit 2.0) + swap(0)
        assert_eq!(net, dec!(996.00000));
        assert_eq!(p.total_commission, dec!(4.0));
        assert!(!p.is_open);
        assert_eq!(p.exit_reason.as_deref(), Some("Take Profit"));
    }

    #[test]
    fn close_adds_signed_swap_into_net_pnl() {
        let mut p = open_long();
        p.accrue_swap(dec!(-5.0));
        let (gross, net) = p.close(dec!(1.1100), dec!(100_000), dec!(2.0), "Take Profit", Utc::now());
        // net = gross - total_commission(4.0) + total_swap(-5.0)
        assert_eq!(net, gross - dec!(4.0) + dec!(-5.0));
        assert_eq!(net, dec!(991.00000));
    }

    #[test]
    fn add_fill_recomputes_weighted_entry_price() {
        let mut p = open_long();
        p.add_fill(dec!(1.1020), dec!(1.0), dec!(2.0), dec!(0.5));
        assert_eq!(p.quantity, dec!(2.0));
        assert_eq!(p.entry_price, (dec!(1.1000) + dec!(1.1020)) / dec!(2));
        assert_eq!(p.total_commission, dec!(4.0));
        assert_eq!(p.spread_cost, dec!(1.0));
    }
}
