//! Price oracle abstraction for current instrument prices.

use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub mod fallback;
pub mod fixed;
pub mod snapshot;
pub mod synthetic;

pub use fallback::FallbackPriceOracle;
pub use fixed::StaticPriceOracle;
pub use snapshot::SnapshotPriceOracle;
pub use synthetic::{base_price, SyntheticPriceFeed};

/// Supplies the current price of an instrument.
///
/// Implementations may read committed snapshots, generate synthetic prices,
/// or return a fixed table. Callers round the result to money precision.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Current price for `symbol`.
    ///
    /// # Errors
    /// `OracleError::Unavailable` when no price is known for the symbol.
    async fn current_price(&self, symbol: &Symbol) -> Result<Decimal, OracleError>;

    /// Current price of every symbol the oracle knows about.
    async fn all_current_prices(&self) -> Result<HashMap<Symbol, Decimal>, OracleError>;
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no price available for {0}")]
    Unavailable(Symbol),
    #[error("price storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
