//! Immutable market-data bar: the only market context matching may read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

/// One time-interval OHLC record with bid/ask and tick volume.
///
/// Bars are assumed ordered by time per symbol; the matching engine never
/// peeks outside the current bar to make a fill decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub tick_volume: u64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        bid: Decimal,
        ask: Decimal,
        tick_volume: u64,
    ) -> Self {
        Self {
            symbol,
            time,
            open,
            high,
            low,
            close,
            bid,
            ask,
            tick_volume,
        }
    }

    /// Basic sanity check used by the façade to detect a malformed/out-of-order
    /// bar: high/low must bound open/close and bid/ask,
    /// and volume fields must be non-negative (enforced by the `u64` type).
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.low <= self.high
            && self.high >= self.open
            && self.high >= self.close
            && self.bid > Decimal::ZERO
            && self.ask >= self.bid
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar::new(
            Symbol::new("EURUSD"),
            Utc::now(),
            open,
            high,
            low,
            close,
            dec!(1.1000),
            dec!(1.1002),
            1000,
        )
    }

    #[test]
    fn well_formed_bar_passes() {
        let b = bar(dec!(1.1000), dec!(1.1010), dec!(1.0990), dec!(1.1005));
        assert!(b.is_well_formed());
    }

    #[test]
    fn high_below_open_is_malformed() {
        let b = bar(dec!(1.1000), dec!(1.0995), dec!(1.0990), dec!(1.0992));
        assert!(!b.is_well_formed());
    }
}
