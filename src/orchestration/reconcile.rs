//! Rebuild derived state from the reward log.
//!
//! Holdings and ledger postings are derived from the append-only reward
//! records and may lag after a post-persistence failure. The reconciler
//! replays every (user, symbol) pair in insertion order, overwrites the
//! aggregate, and posts any group that is missing.
//!
//! Intended to run while no grants are in flight (e.g. at startup).

use crate::db::Repository;
use crate::domain::{HoldingPosition, Symbol, TimeMs, UserId};
use crate::engine::{apply_to_position, build_postings, PositionError};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

const PAIR_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pairs_rebuilt: usize,
    pub reversals_skipped: usize,
    pub groups_posted: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    repo: Arc<Repository>,
}

impl Reconciler {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let pairs = self.repo.query_reward_pairs().await?;
        let pairs_rebuilt = pairs.len();

        let skipped: Vec<usize> = stream::iter(pairs)
            .map(|(user, symbol)| async move { self.rebuild_pair(&user, &symbol).await })
            .buffer_unordered(PAIR_CONCURRENCY)
            .try_collect()
            .await?;

        let mut groups_posted = 0;
        for record in self.repo.query_rewards_missing_postings().await? {
            let postings = build_postings(&record, TimeMs::now());
            if self.repo.insert_postings(&postings).await? > 0 {
                groups_posted += 1;
            }
        }

        let report = ReconcileReport {
            pairs_rebuilt,
            reversals_skipped: skipped.into_iter().sum(),
            groups_posted,
        };
        info!(
            pairs_rebuilt = report.pairs_rebuilt,
            reversals_skipped = report.reversals_skipped,
            groups_posted = report.groups_posted,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Replay one pair and overwrite its holding. Returns the number of
    /// reductions skipped because they would have gone negative.
    async fn rebuild_pair(&self, user: &UserId, symbol: &Symbol) -> Result<usize, sqlx::Error> {
        let records = self.repo.query_rewards_for_pair(user, symbol).await?;
        let mut position: Option<HoldingPosition> = None;
        let mut skipped = 0;

        for record in &records {
            match apply_to_position(
                position.as_ref(),
                user,
                symbol,
                record.quantity,
                record.price_per_unit,
                record.recorded_at,
            ) {
                Ok(next) => position = Some(next),
                Err(PositionError::WouldGoNegative { held, delta }) => {
                    warn!(
                        reward_id = %record.reward_id,
                        user = %user,
                        symbol = %symbol,
                        held = %held,
                        delta = %delta,
                        "Skipping reversal that would leave a negative holding"
                    );
                    skipped += 1;
                }
                Err(e @ PositionError::Overflow { .. }) => {
                    error!(
                        reward_id = %record.reward_id,
                        user = %user,
                        symbol = %symbol,
                        error = %e,
                        "Skipping record whose cost basis cannot be represented"
                    );
                }
                Err(PositionError::ZeroQuantity) => {}
            }
        }

        if let Some(rebuilt) = position {
            self.repo.overwrite_holding(&rebuilt).await?;
        }
        Ok(skipped)
    }
}
