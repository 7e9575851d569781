//! Pure computation engine(s) for deterministic ledger logic.
//!
//! Nothing in here performs I/O: fees, weighted-average position updates,
//! posting construction and valuation are plain functions over domain types.

pub mod fees;
pub mod holdings;
pub mod postings;
pub mod valuation;

pub use fees::{compute_fees, FeeSchedule};
pub use holdings::{apply_to_position, PositionError, AVERAGE_COST_DP};
pub use postings::build_postings;
pub use valuation::{summarize, value_holding, HoldingValuation, PortfolioSummary};
