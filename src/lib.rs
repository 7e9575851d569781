pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod pricing;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, GrantRequest, HoldingPosition, LedgerPosting, RewardKind, RewardRecord, Symbol,
    TimeMs, UserId,
};
pub use error::AppError;
pub use orchestration::{GrantError, GrantOutcome, Reconciler, RewardEngine};
pub use pricing::{PriceOracle, StaticPriceOracle};
