//! Stable string identities for orders, fills, positions and trades.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        #[allow(dead_code)]
        const _: &str = $prefix;
    };
}

string_id!(OrderId, "ORD");
string_id!(FillId, "FIL");
string_id!(PositionId, "POS");
string_id!(TradeId, "TRD");

/// Monotonic, per-instance id generator producing externally stable strings.
///
/// Each broker owns one generator per id kind so replaying a persisted event
/// stream into a fresh kernel never collides with
/// live-generated ids, as long as the fresh kernel starts its own sequence
/// from zero and only ever consumes ids that were already persisted.
pub struct IdSequence {
    prefix: &'static str,
    counter: AtomicU64,
}

impl IdSequence {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{seq:012x}", self.prefix)
    }
}
