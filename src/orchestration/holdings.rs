//! Serialized read-modify-write of holding positions.
//!
//! Each attempt reads the current row, computes the next state, and writes it
//! back only if the stored version is unchanged. Losing writers back off and
//! retry against the fresh row, so concurrent grants for one pair never lose
//! an update while different pairs proceed independently.

use crate::db::Repository;
use crate::domain::{Decimal, HoldingPosition, Symbol, TimeMs, UserId};
use crate::engine::{apply_to_position, PositionError};
use backoff::future::retry;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HoldingsError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error("concurrent update to holding {user}/{symbol}")]
    Conflict { user: UserId, symbol: Symbol },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct HoldingsAggregator {
    repo: Arc<Repository>,
    max_elapsed: Duration,
}

impl HoldingsAggregator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            max_elapsed: Duration::from_secs(10),
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(2))
            .with_max_interval(Duration::from_millis(100))
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }

    /// Apply a signed quantity at `price` to the (user, symbol) position.
    ///
    /// # Errors
    /// `Position` when the change would leave a negative quantity (state is
    /// left unchanged), `Conflict` if contention outlasts the retry budget,
    /// `Db` on storage failure.
    pub async fn apply_grant(
        &self,
        user: &UserId,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<HoldingPosition, HoldingsError> {
        let repo = &*self.repo;

        retry(self.backoff(), move || async move {
            let existing = repo
                .get_holding(user, symbol)
                .await
                .map_err(|e| backoff::Error::permanent(HoldingsError::from(e)))?;

            let next = apply_to_position(
                existing.as_ref(),
                user,
                symbol,
                quantity,
                price,
                TimeMs::now(),
            )
            .map_err(|e| backoff::Error::permanent(HoldingsError::from(e)))?;

            let written = match &existing {
                None => repo.insert_holding_if_absent(&next).await,
                Some(current) => repo.update_holding_cas(&next, current.version).await,
            }
            .map_err(|e| backoff::Error::permanent(HoldingsError::from(e)))?;

            if written {
                Ok(next)
            } else {
                debug!(user = %user, symbol = %symbol, "Holding changed underneath, retrying");
                Err(backoff::Error::transient(HoldingsError::Conflict {
                    user: user.clone(),
                    symbol: symbol.clone(),
                }))
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_test_db;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_apply_grant_creates_then_updates() {
        let (repo, _temp) = setup_test_db().await;
        let agg = HoldingsAggregator::new(Arc::new(repo));
        let user = UserId::new("u1".to_string());
        let infy = Symbol::new("INFY".to_string());

        let p = agg.apply_grant(&user, &infy, d("5"), d("1500")).await.unwrap();
        assert_eq!(p.version, 1);
        let p = agg.apply_grant(&user, &infy, d("3"), d("1600")).await.unwrap();
        assert_eq!(p.total_quantity, d("8"));
        assert_eq!(p.average_cost, d("1537.5"));
        assert_eq!(p.version, 2);
    }

    #[tokio::test]
    async fn test_negative_result_leaves_state_unchanged() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        let agg = HoldingsAggregator::new(repo.clone());
        let user = UserId::new("u1".to_string());
        let tcs = Symbol::new("TCS".to_string());

        agg.apply_grant(&user, &tcs, d("1"), d("3500")).await.unwrap();
        let err = agg
            .apply_grant(&user, &tcs, d("-2"), d("3500"))
            .await
            .unwrap_err();
        assert!(matches!(err, HoldingsError::Position(PositionError::WouldGoNegative { .. })));

        let stored = repo.get_holding(&user, &tcs).await.unwrap().unwrap();
        assert_eq!(stored.total_quantity, d("1"));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_serialized() {
        let (repo, _temp) = setup_test_db().await;
        let agg = Arc::new(HoldingsAggregator::new(Arc::new(repo)));
        let user = UserId::new("u1".to_string());
        let tcs = Symbol::new("TCS".to_string());

        let mut handles = Vec::new();
        for i in 1..=10u32 {
            let agg = agg.clone();
            let user = user.clone();
            let tcs = tcs.clone();
            handles.push(tokio::spawn(async move {
                agg.apply_grant(&user, &tcs, Decimal::from(i), Decimal::from(i * 10))
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let final_pos = agg.repo.get_holding(&user, &tcs).await.unwrap().unwrap();
        // sum(i) = 55, sum(i * 10i) = 3850
        assert_eq!(final_pos.total_quantity, d("55"));
        assert_eq!(final_pos.version, 10);
        let expected = d("3850") / d("55");
        assert!((final_pos.average_cost - expected).abs() <= d("0.000001"));
    }
}
