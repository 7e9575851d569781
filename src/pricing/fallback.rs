//! Primary oracle with an optional fallback.

use super::{OracleError, PriceOracle};
use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Consults `fallback` only when `primary` has no price for a symbol.
///
/// Storage errors from the primary are propagated, never masked.
#[derive(Debug, Clone)]
pub struct FallbackPriceOracle {
    primary: Arc<dyn PriceOracle>,
    fallback: Option<Arc<dyn PriceOracle>>,
}

impl FallbackPriceOracle {
    pub fn new(primary: Arc<dyn PriceOracle>, fallback: Option<Arc<dyn PriceOracle>>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl PriceOracle for FallbackPriceOracle {
    async fn current_price(&self, symbol: &Symbol) -> Result<Decimal, OracleError> {
        match self.primary.current_price(symbol).await {
            Err(OracleError::Unavailable(_)) => match &self.fallback {
                Some(fallback) => {
                    warn!(symbol = %symbol, "No committed price, using fallback price");
                    fallback.current_price(symbol).await
                }
                None => Err(OracleError::Unavailable(symbol.clone())),
            },
            other => other,
        }
    }

    async fn all_current_prices(&self) -> Result<HashMap<Symbol, Decimal>, OracleError> {
        let mut prices = self.primary.all_current_prices().await?;
        if let Some(fallback) = &self.fallback {
            for (symbol, price) in fallback.all_current_prices().await? {
                prices.entry(symbol).or_insert(price);
            }
        }
        Ok(prices)
    }
}
