//! Exactly-once admission of reward requests by idempotency key.

use crate::db::Repository;
use crate::domain::RewardRecord;
use std::sync::Arc;

/// Outcome of looking a key up, or of trying to claim it.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No record owns the key (lookup) or the new record now owns it (commit).
    Admitted,
    /// Another request already owns the key; this is its record, unchanged.
    Replay(RewardRecord),
}

#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    repo: Arc<Repository>,
}

impl IdempotencyGuard {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Cheap pre-check before any pricing work. Not atomic on its own; the
    /// authoritative check is [`IdempotencyGuard::commit`].
    pub async fn admit_or_replay(&self, idempotency_key: &str) -> Result<Admission, sqlx::Error> {
        Ok(match self.repo.get_reward_by_key(idempotency_key).await? {
            Some(existing) => Admission::Replay(existing),
            None => Admission::Admitted,
        })
    }

    /// Persist `record`, claiming its idempotency key atomically.
    ///
    /// When a concurrent request claimed the key first, the insert is a
    /// no-op and the winner's record is returned as a replay.
    ///
    /// # Errors
    /// Storage failures, including the winner's record vanishing between the
    /// conflicting insert and the re-fetch.
    pub async fn commit(&self, record: &RewardRecord) -> Result<Admission, sqlx::Error> {
        if self.repo.insert_reward(record).await? {
            return Ok(Admission::Admitted);
        }
        self.repo
            .get_reward_by_key(&record.idempotency_key)
            .await?
            .map(Admission::Replay)
            .ok_or(sqlx::Error::RowNotFound)
    }
}
