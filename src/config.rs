use crate::domain::Decimal;
use crate::engine::FeeSchedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub brokerage_fee_bp: Decimal,
    pub transaction_tax_bp: Decimal,
    pub exchange_fee_bp: Decimal,
    pub regulatory_fee_bp: Decimal,
    pub tax_on_brokerage_pct: Decimal,
    pub price_update_interval: Duration,
    pub price_fallback: PriceFallback,
    pub reconcile_on_startup: bool,
}

/// What to do when no committed price exists for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceFallback {
    /// Reject the grant as price-unavailable.
    None,
    /// Use the synthetic feed's base price.
    Synthetic,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let price_update_interval_secs = env_map
            .get("PRICE_UPDATE_INTERVAL_SECS")
            .map(|s| s.as_str())
            .unwrap_or("3600")
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PRICE_UPDATE_INTERVAL_SECS".to_string(),
                    "must be a positive number of seconds".to_string(),
                )
            })?;

        let price_fallback = match env_map
            .get("PRICE_FALLBACK")
            .map(|s| s.as_str())
            .unwrap_or("none")
        {
            "none" => PriceFallback::None,
            "synthetic" => PriceFallback::Synthetic,
            other => {
                return Err(ConfigError::InvalidValue(
                    "PRICE_FALLBACK".to_string(),
                    format!("must be none or synthetic, got {}", other),
                ))
            }
        };

        let reconcile_on_startup = match env_map
            .get("RECONCILE_ON_STARTUP")
            .map(|s| s.as_str())
            .unwrap_or("false")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RECONCILE_ON_STARTUP".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        Ok(Config {
            port,
            database_path,
            brokerage_fee_bp: parse_rate(&env_map, "BROKERAGE_FEE_BP", "5")?,
            transaction_tax_bp: parse_rate(&env_map, "TRANSACTION_TAX_BP", "25")?,
            exchange_fee_bp: parse_rate(&env_map, "EXCHANGE_FEE_BP", "3")?,
            regulatory_fee_bp: parse_rate(&env_map, "REGULATORY_FEE_BP", "1")?,
            tax_on_brokerage_pct: parse_rate(&env_map, "TAX_ON_BROKERAGE_PCT", "18")?,
            price_update_interval: Duration::from_secs(price_update_interval_secs),
            price_fallback,
            reconcile_on_startup,
        })
    }

    /// Fee schedule shared by every grant for the life of the process.
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            brokerage_bp: self.brokerage_fee_bp,
            transaction_tax_bp: self.transaction_tax_bp,
            exchange_fee_bp: self.exchange_fee_bp,
            regulatory_fee_bp: self.regulatory_fee_bp,
            tax_on_brokerage_pct: self.tax_on_brokerage_pct,
        }
    }
}

fn parse_rate(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Decimal::from_str(raw.trim())
        .ok()
        .filter(|rate| !rate.is_negative())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                key.to_string(),
                format!("must be a non-negative decimal, got {}", raw),
            )
        })
}
