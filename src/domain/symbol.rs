//! Trading symbol identity.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote currency is conventionally the last 3 characters of an FX pair
    /// (e.g. `USDJPY` -> `JPY`). Used only by the default point-size lookup
    /// in `cost` when a symbol has no explicit `SymbolMeta` entry.
    pub fn quote_currency(&self) -> &str {
        let s = self.0.as_str();
        if s.len() >= 3 {
            &s[s.len() - 3..]
        } else {
            s
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}
