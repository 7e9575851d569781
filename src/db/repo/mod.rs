//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `rewards.rs` - Append-only reward records
//! - `holdings.rs` - Aggregated positions with compare-and-swap updates
//! - `ledger.rs` - Double-entry postings
//! - `reference.rs` - Instruments and price snapshots

mod holdings;
mod ledger;
mod reference;
mod rewards;

pub use rewards::ReversalCommit;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a stored decimal column, logging and defaulting on corruption.
fn parse_decimal(column: &str, raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "Failed to parse stored decimal, using default");
        Decimal::default()
    })
}
