//! Fixed price table for tests and demos.

use super::{OracleError, PriceOracle};
use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use std::collections::HashMap;

/// Oracle returning prices from an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceOracle {
    prices: HashMap<Symbol, Decimal>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the price returned for a symbol.
    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(Symbol::new(symbol.to_string()), price);
        self
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn current_price(&self, symbol: &Symbol) -> Result<Decimal, OracleError> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| OracleError::Unavailable(symbol.clone()))
    }

    async fn all_current_prices(&self) -> Result<HashMap<Symbol, Decimal>, OracleError> {
        Ok(self.prices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_oracle_lookup() {
        let oracle = StaticPriceOracle::new().with_price("TCS", Decimal::from(3500u32));

        let price = oracle
            .current_price(&Symbol::new("TCS".to_string()))
            .await
            .unwrap();
        assert_eq!(price, Decimal::from(3500u32));

        let missing = oracle.current_price(&Symbol::new("INFY".to_string())).await;
        assert!(matches!(missing, Err(OracleError::Unavailable(s)) if s.as_str() == "INFY"));
        assert_eq!(oracle.all_current_prices().await.unwrap().len(), 1);
    }
}
