//! Instrument reference data and price snapshots.

use crate::domain::{Decimal, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// Reference row for a tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub display_name: String,
    pub venue: String,
    /// Inactive (e.g. delisted) instruments cannot be rewarded.
    pub is_active: bool,
}

/// One observation in the append-only price series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: Symbol,
    pub price: Decimal,
    pub time_ms: TimeMs,
    pub source: String,
}
