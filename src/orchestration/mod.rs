//! Stateful workflows over the repository: reward ingestion, holdings
//! aggregation, reconciliation and the background price refresher.

pub mod grant;
pub mod holdings;
pub mod idempotency;
pub mod price_refresh;
pub mod reconcile;

pub use grant::{GrantError, GrantOutcome, RewardEngine};
pub use holdings::{HoldingsAggregator, HoldingsError};
pub use idempotency::{Admission, IdempotencyGuard};
pub use price_refresh::PriceRefresher;
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
