//! Oracle backed by the committed price series.

use super::{OracleError, PriceOracle};
use crate::db::Repository;
use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Reads the latest committed `PriceSnapshot` per symbol.
#[derive(Debug, Clone)]
pub struct SnapshotPriceOracle {
    repo: Arc<Repository>,
}

impl SnapshotPriceOracle {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PriceOracle for SnapshotPriceOracle {
    async fn current_price(&self, symbol: &Symbol) -> Result<Decimal, OracleError> {
        self.repo
            .latest_price(symbol)
            .await?
            .map(|snapshot| snapshot.price)
            .ok_or_else(|| OracleError::Unavailable(symbol.clone()))
    }

    async fn all_current_prices(&self) -> Result<HashMap<Symbol, Decimal>, OracleError> {
        Ok(self.repo.latest_prices().await?)
    }
}
