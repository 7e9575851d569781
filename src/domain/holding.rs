//! Aggregated per-user position in one instrument.

use crate::domain::{Decimal, Symbol, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Current position for a (user, symbol) pair.
///
/// Exactly one row exists per pair once the first reward lands. `version`
/// increases on every write and guards compare-and-swap updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingPosition {
    pub user: UserId,
    pub symbol: Symbol,
    pub total_quantity: Decimal,
    /// Weighted-average price per unit across contributing records.
    pub average_cost: Decimal,
    pub last_updated: TimeMs,
    pub version: i64,
}

impl HoldingPosition {
    /// Cost basis implied by the aggregate (quantity x average cost).
    pub fn cost_basis(&self) -> Decimal {
        self.total_quantity * self.average_cost
    }

    pub fn is_empty(&self) -> bool {
        self.total_quantity.is_zero()
    }
}
