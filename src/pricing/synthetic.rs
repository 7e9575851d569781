//! Synthetic price generator.
//!
//! Prices wander uniformly within +/-5% of a per-symbol base price and are
//! truncated to two fractional digits.

use super::{OracleError, PriceOracle};
use crate::domain::{Decimal, Symbol};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;

const BASE_PRICES: [(&str, u32); 10] = [
    ("RELIANCE", 2500),
    ("TCS", 3500),
    ("INFY", 1500),
    ("HDFCBANK", 1600),
    ("ICICIBANK", 950),
    ("HINDUNILVR", 2400),
    ("ITC", 450),
    ("BHARTIARTL", 900),
    ("KOTAKBANK", 1750),
    ("WIPRO", 420),
];

const DEFAULT_BASE_PRICE: u32 = 1000;

/// Maximum variation in basis points either side of the base price.
const MAX_VARIATION_BP: i64 = 500;

/// Base price for a symbol. Unknown symbols get a flat default.
pub fn base_price(symbol: &Symbol) -> Decimal {
    BASE_PRICES
        .iter()
        .find(|(s, _)| *s == symbol.as_str())
        .map(|(_, p)| Decimal::from(*p))
        .unwrap_or_else(|| Decimal::from(DEFAULT_BASE_PRICE))
}

/// Apply a variation in basis points to `base`, truncating to 2 digits.
fn vary(base: Decimal, variation_bp: i64) -> Decimal {
    let factor = Decimal::new(rust_decimal::Decimal::from(10_000 + variation_bp))
        / Decimal::ten_thousand();
    (base * factor).truncate(2)
}

#[derive(Debug, Clone, Copy)]
pub struct SyntheticPriceFeed {
    varied: bool,
}

impl SyntheticPriceFeed {
    /// Feed producing randomly varied prices.
    pub fn new() -> Self {
        Self { varied: true }
    }

    /// Feed returning the unvaried base price. Used as the pricing fallback.
    pub fn base_only() -> Self {
        Self { varied: false }
    }

    /// Generate a price for one symbol.
    pub fn generate(&self, symbol: &Symbol) -> Decimal {
        let base = base_price(symbol);
        if !self.varied {
            return base;
        }
        let variation_bp = rand::thread_rng().gen_range(-MAX_VARIATION_BP..=MAX_VARIATION_BP);
        vary(base, variation_bp)
    }
}

impl Default for SyntheticPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for SyntheticPriceFeed {
    async fn current_price(&self, symbol: &Symbol) -> Result<Decimal, OracleError> {
        Ok(self.generate(symbol))
    }

    async fn all_current_prices(&self) -> Result<HashMap<Symbol, Decimal>, OracleError> {
        Ok(BASE_PRICES
            .iter()
            .map(|(s, _)| {
                let symbol = Symbol::new(s.to_string());
                let price = self.generate(&symbol);
                (symbol, price)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_base_prices() {
        assert_eq!(base_price(&Symbol::new("TCS".to_string())), d("3500"));
        assert_eq!(base_price(&Symbol::new("WIPRO".to_string())), d("420"));
        assert_eq!(base_price(&Symbol::new("ACME".to_string())), d("1000"));
    }

    #[test]
    fn test_vary_bounds_and_truncation() {
        assert_eq!(vary(d("420"), 500), d("441"));
        assert_eq!(vary(d("420"), -500), d("399"));
        // 950 * 1.0001 = 950.095 truncates, never rounds up
        assert_eq!(vary(d("950"), 1), d("950.09"));
    }

    #[test]
    fn test_generated_prices_stay_within_five_percent() {
        let feed = SyntheticPriceFeed::new();
        let symbol = Symbol::new("INFY".to_string());
        for _ in 0..200 {
            let price = feed.generate(&symbol);
            assert!(price >= d("1425") && price <= d("1575"), "out of range: {}", price);
            assert!(price.fractional_digits() <= 2);
        }
    }

    #[tokio::test]
    async fn test_base_only_feed_is_deterministic() {
        let feed = SyntheticPriceFeed::base_only();
        let price = feed
            .current_price(&Symbol::new("ITC".to_string()))
            .await
            .unwrap();
        assert_eq!(price, d("450"));
        assert_eq!(feed.all_current_prices().await.unwrap().len(), 10);
    }
}
