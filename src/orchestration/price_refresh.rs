//! Periodic synthetic price snapshots.

use crate::db::Repository;
use crate::domain::{PriceSnapshot, TimeMs};
use crate::pricing::SyntheticPriceFeed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const SNAPSHOT_SOURCE: &str = "synthetic";

/// Appends a fresh snapshot for every active instrument on a fixed interval.
///
/// Shares nothing with the grant path beyond the append-only price series.
#[derive(Debug, Clone)]
pub struct PriceRefresher {
    repo: Arc<Repository>,
    feed: SyntheticPriceFeed,
    interval: Duration,
}

impl PriceRefresher {
    pub fn new(repo: Arc<Repository>, feed: SyntheticPriceFeed, interval: Duration) -> Self {
        Self {
            repo,
            feed,
            interval,
        }
    }

    /// Run until the task is aborted. The first refresh happens immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                match self.refresh_once().await {
                    Ok(updated) => info!(updated, "Price snapshots refreshed"),
                    Err(e) => error!(error = %e, "Failed to list instruments for price refresh"),
                }
            }
        })
    }

    /// Snapshot every active instrument once. A failure for one symbol is
    /// logged and does not stop the rest. Returns the number written.
    pub async fn refresh_once(&self) -> Result<usize, sqlx::Error> {
        let instruments = self.repo.list_active_instruments().await?;
        let now = TimeMs::now();
        let mut updated = 0;

        for instrument in instruments {
            let snapshot = PriceSnapshot {
                price: self.feed.generate(&instrument.symbol),
                symbol: instrument.symbol,
                time_ms: now,
                source: SNAPSHOT_SOURCE.to_string(),
            };
            match self.repo.insert_price_snapshot(&snapshot).await {
                Ok(()) => updated += 1,
                Err(e) => error!(symbol = %snapshot.symbol, error = %e, "Failed to store price snapshot"),
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_test_db;
    use crate::domain::{Decimal, Symbol};

    #[tokio::test]
    async fn test_refresh_snapshots_active_instruments() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        let refresher = PriceRefresher::new(
            repo.clone(),
            SyntheticPriceFeed::base_only(),
            Duration::from_secs(3600),
        );

        assert_eq!(refresher.refresh_once().await.unwrap(), 10);

        let tcs = repo
            .latest_price(&Symbol::new("TCS".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tcs.price, Decimal::from(3500u32));
        assert_eq!(tcs.source, SNAPSHOT_SOURCE);
    }

    #[tokio::test]
    async fn test_spawned_task_runs_first_tick_immediately() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        let handle = PriceRefresher::new(
            repo.clone(),
            SyntheticPriceFeed::new(),
            Duration::from_secs(3600),
        )
        .spawn();

        let mut prices = Default::default();
        for _ in 0..50 {
            prices = repo.latest_prices().await.unwrap();
            if prices.len() == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert_eq!(prices.len(), 10);
    }
}
