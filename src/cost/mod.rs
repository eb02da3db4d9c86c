//! Cost model: pure functions over order/market context.
//! No shared mutable state beyond the injected RNG draws for slippage.

use rust_decimal::Decimal;

use crate::config::{BrokerConfig, CostConfig, SymbolMeta};
use crate::domain::{Side, Symbol};
use crate::rng::BrokerRng;

pub struct CostModel<'a> {
    cost: &'a CostConfig,
    meta: SymbolMeta,
}

impl<'a> CostModel<'a> {
    pub fn for_symbol(config: &'a BrokerConfig, symbol: &Symbol) -> Self {
        Self {
            cost: &config.cost,
            meta: config.symbol_meta(symbol),
        }
    }

    pub fn point_size(&self, symbol: &Symbol) -> Decimal {
        self.meta
            .point_size
            .unwrap_or_else(|| crate::config::default_point_size(symbol))
    }

    pub fn contract_multiplier(&self) -> Decimal {
        self.meta.contract_multiplier
    }

    /// Commission charged per side, deducted from balance at fill time.
    pub fn commission(&self, fill_volume: Decimal) -> Decimal {
        fill_volume * self.cost.commission_per_lot
    }

    /// Bars whose tick volume is below `spread_volume_threshold` widen the
    /// spread, capped by `max_spread_multiplier`.
    pub fn spread_multiplier(&self, bar_volume: u64) -> Decimal {
        let threshold = self.cost.spread_volume_threshold;
        if bar_volume >= threshold || threshold == 0 {
            return Decimal::ONE;
        }
        let deficit = Decimal::from(threshold - bar_volume) / Decimal::from(threshold);
        (Decimal::ONE + deficit).min(self.cost.max_spread_multiplier)
    }

    /// Spread cost borne against a position: `|ask - bid| * qty * multiplier`.
    pub fn spread_cost(&self, bid: Decimal, ask: Decimal, qty: Decimal) -> Decimal {
        (ask - bid).abs() * qty * self.contract_multiplier()
    }

    /// Spread cost widened for thin bars, per `spread_multiplier`.
    pub fn effective_spread_cost(
        &self,
        bid: Decimal,
        ask: Decimal,
        qty: Decimal,
        bar_volume: u64,
    ) -> Decimal {
        self.spread_cost(bid, ask, qty) * self.spread_multiplier(bar_volume)
    }

    /// Slippage drawn from a bounded distribution at fill, in price units
    /// (converted from pips via the symbol's point size).
    pub fn market_slippage(&self, rng: &mut BrokerRng, symbol: &Symbol) -> Decimal {
        let point = self.point_size(symbol);
        let avg = self.cost.slippage_pips_avg * point;
        let max = self.cost.slippage_pips_max * point;
        rng.slippage(avg, max)
    }

    /// Adverse slippage applied when a stop-loss triggers.
    pub fn sl_slippage(&self, rng: &mut BrokerRng, symbol: &Symbol) -> Decimal {
        self.market_slippage(rng, symbol) * self.cost.sl_slippage_multiplier
    }

    /// Favourable (or reduced) slippage applied when a take-profit triggers.
    pub fn tp_slippage(&self, rng: &mut BrokerRng, symbol: &Symbol) -> Decimal {
        self.market_slippage(rng, symbol) * self.cost.tp_slippage_multiplier
    }

    /// Per-lot per-overnight swap charge for one side, as a signed balance
    /// delta (negative is a debit).
    pub fn swap_charge(&self, side: Side, lots: Decimal) -> Decimal {
        let per_lot = match side {
            Side::Buy => self.cost.swap_long,
            Side::Sell => self.cost.swap_short,
        };
        per_lot * lots
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use rust_decimal_macros::dec;

    #[test]
    fn low_volume_widens_spread_up_to_cap() {
        let config = BrokerConfig::default();
        let model = CostModel::for_symbol(&config, &Symbol::new("EURUSD"));
        assert_eq!(model.spread_multiplier(500), Decimal::ONE);
        assert!(model.spread_multiplier(0) <= config.cost.max_spread_multiplier);
        assert!(model.spread_multiplier(0) > Decimal::ONE);
    }

    #[test]
    fn commission_scales_with_volume() {
        let config = BrokerConfig::default();
        let model = CostModel::for_symbol(&config, &Symbol::new("EURUSD"));
        assert_eq!(model.commission(dec!(2)), config.cost.commission_per_lot * dec!(2));
    }

    #[test]
    fn effective_spread_cost_widens_under_thin_volume() {
        let config = BrokerConfig::default();
        let model = CostModel::for_symbol(&config, &Symbol::new("EURUSD"));
        let normal = model.effective_spread_cost(dec!(1.0999), dec!(1.1001), dec!(1), 1000);
        let thin = model.effective_spread_cost(dec!(1.0999), dec!(1.1001), dec!(1), 0);
        assert!(thin > normal);
    }

    #[test]
    fn swap_sign_differs_by_side() {
        let config = BrokerConfig::default();
        let model = CostModel::for_symbol(&config, &Symbol::new("EURUSD"));
        let long = model.swap_charge(Side::Buy, dec!(1));
        let short = model.swap_charge(Side::Sell, dec!(1));
        assert_eq!(long, config.cost.swap_long);
        assert_eq!(short, config.cost.swap_short);
    }
}
