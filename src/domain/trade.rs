//! Trade: the immutable, analytics-ready record of one closed round-trip.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{PositionId, TradeId};
use super::order::Side;
use super::symbol::Symbol;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub direction: Side,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub lot_size: Decimal,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    pub spread_cost: Decimal,
    pub slippage: Decimal,
    pub net_pnl: Decimal,
    pub pips: Decimal,
    pub duration_hours: Decimal,
    pub exit_reason: String,
    pub balance_after: Decimal,
    pub equity_after: Decimal,
    pub drawdown_pct: Decimal,
    pub strategy_name: Option<String>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn from_closed_position(
        trade_id: TradeId,
        position_id: PositionId,
        symbol: Symbol,
        direction: Side,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        entry_price: Decimal,
        exit_price: Decimal,
        lot_size: Decimal,
        gross_pnl: Decimal,
        commission: Decimal,
        swap: Decimal,
        spread_cost: Decimal,
        slippage: Decimal,
        net_pnl: Decimal,
        point_size: Decimal,
        exit_reason: String,
        balance_after: Decimal,
        equity_after: Decimal,
        drawdown_pct: Decimal,
        strategy_name: Option<String>,
    ) -> Self {
        let duration_hours = Decimal::from(
            (exit_time - entry_time).num_seconds().max(0),
        ) / Decimal::from(3600);
        let signed_move = match direction {
            Side::Buy => exit_price - entry_price,
            Side::Sell => entry_price - exit_price,
        };
        let pips = if point_size > Decimal::ZERO {
            signed_move / point_size
        } else {
            Decimal::ZERO
        };

        Self {
            trade_id,
            position_id,
            symbol,
            direction,
            entry_time,
            exit_time,
            entry_price,
            exit_price,
            lot_size,
            gross_pnl,
            commission,
            swap,
            spread_cost,
            slippage,
            net_pnl,
            pips,
            duration_hours,
            exit_reason,
            balance_after,
            equity_after,
            drawdown_pct,
            strategy_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pips_sign_follows_direction() {
        let now = Utc::now();
        let long = Trade::from_closed_position(
            TradeId::new("TRD-1"),
            PositionId::new("POS-1"),
            Symbol::new("EURUSD"),
            Side::Buy,
            now,
            now,
            dec!(1.1000),
            dec!(1.1050),
            dec!(1.0),
            dec!(500),
            dec!(7),
            dec!(0),
            dec!(2),
            dec!(0),
            dec!(491),
            dec!(0.0001),
            "Take Profit".to_string(),
            dec!(10491),
            dec!(10491),
            dec!(0),
            None,
        );
        assert_eq!(long.pips, dec!(50));

        let short = Trade::from_closed_position(
            TradeId::new("TRD-2"),
            PositionId::new("POS-2"),
            Symbol::new("EURUSD"),
            Side::Sell,
            now,
            now,
            dec!(1.1000),
            dec!(1.1050),
            dec!(1.0),
            dec!(-500),
            dec!(7),
            dec!(0),
            dec!(2),
            dec!(0),
            dec!(-509),
            dec!(0.0001),
            "Stop Loss".to_string(),
            dec!(9491),
            dec!(9491),
            dec!(0),
            None,
        );
        assert_eq!(short.pips, dec!(-50));
    }
}
