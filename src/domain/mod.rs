//! Domain types for the reward ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper and fixed-point rounding
//! - Domain primitives: TimeMs, UserId, Symbol
//! - Reward requests/records, holdings, ledger postings and reference data

pub mod decimal;
pub mod holding;
pub mod instrument;
pub mod ledger;
pub mod primitives;
pub mod reward;

pub use decimal::{Decimal, MONEY_DP, QUANTITY_DP};
pub use holding::HoldingPosition;
pub use instrument::{Instrument, PriceSnapshot};
pub use ledger::{is_balanced, AccountType, LedgerPosting};
pub use primitives::{IdentifierParseError, Symbol, TimeMs, UserId};
pub use reward::{
    compute_request_fingerprint, FeeBreakdown, GrantRequest, RewardKind, RewardRecord,
    ValidGrant, ValidationError, MAX_QUANTITY,
};
