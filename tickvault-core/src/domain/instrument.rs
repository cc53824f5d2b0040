use super::contract::Contract;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument kind as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Stock,
    Forex,
    Future,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrumentKind::Stock => "stock",
            InstrumentKind::Forex => "forex",
            InstrumentKind::Future => "future",
        };
        f.write_str(s)
    }
}

/// Something a provider can be asked for bars of.
///
/// Stocks and forex pairs are continuous series; futures are dated
/// contracts that each expire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Instrument {
    Stock { id: String, symbol: String },
    Forex { id: String, symbol: String },
    Future(Contract),
}

impl Instrument {
    /// Identity of the configured instrument. All contracts of one futures
    /// root share the root as their id.
    pub fn id(&self) -> &str {
        match self {
            Instrument::Stock { id, .. } | Instrument::Forex { id, .. } => id,
            Instrument::Future(c) => &c.root,
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Stock { .. } => InstrumentKind::Stock,
            Instrument::Forex { .. } => InstrumentKind::Forex,
            Instrument::Future(_) => InstrumentKind::Future,
        }
    }

    /// Symbol used as the storage key.
    pub fn symbol(&self) -> String {
        match self {
            Instrument::Stock { symbol, .. } | Instrument::Forex { symbol, .. } => symbol.clone(),
            Instrument::Future(c) => c.symbol(),
        }
    }

    pub fn is_dated(&self) -> bool {
        matches!(self, Instrument::Future(_))
    }

    pub fn contract(&self) -> Option<&Contract> {
        match self {
            Instrument::Future(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
