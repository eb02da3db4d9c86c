//! Injectable, seedable pseudo-random source for slippage draws and
//! stochastic rejection, so tests are reproducible. Every
//! broker instance owns exactly one of these; nothing reaches into the
//! global `rand` thread-RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct BrokerRng {
    inner: StdRng,
}

impl BrokerRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws a non-negative slippage amount bounded by `max`, averaging
    /// roughly `avg` over many draws (uniform on `[0, 2*avg]`, clamped to
    /// `max`).
    pub fn slippage(&mut self, avg: Decimal, max: Decimal) -> Decimal {
        if avg <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let upper = (avg * dec!(2)).min(max).to_f64().unwrap_or(0.0);
        let draw = self.inner.gen_range(0.0..=upper.max(0.0));
        Decimal::from_f64_retain(draw).unwrap_or(Decimal::ZERO).min(max)
    }

    /// `true` with probability `p` (`p` in `[0, 1]`).
    pub fn roll(&mut self, p: Decimal) -> bool {
        if p <= Decimal::ZERO {
            return false;
        }
        if p >= Decimal::ONE {
            return true;
        }
        let p = p.to_f64().unwrap_or(0.0);
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }
}
