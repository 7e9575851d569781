//! Reward ingestion: the single write path for grants and reversals.

use crate::db::{Repository, ReversalCommit};
use crate::domain::{
    Decimal, FeeBreakdown, GrantRequest, RewardKind, RewardRecord, Symbol, TimeMs, UserId,
    ValidGrant, ValidationError, MONEY_DP,
};
use crate::engine::{apply_to_position, build_postings, compute_fees, FeeSchedule};
use crate::orchestration::holdings::HoldingsAggregator;
use crate::orchestration::idempotency::{Admission, IdempotencyGuard};
use crate::pricing::{OracleError, PriceOracle};
use backoff::future::retry;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Failures that happen before a record is persisted. Nothing durable
/// changes when one of these is returned.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("invalid request: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error("instrument {0} is unknown or inactive")]
    InstrumentInactiveOrUnknown(Symbol),
    #[error("no price available for {0}")]
    PriceUnavailable(Symbol),
    #[error("cannot reverse {requested} units of {symbol}: only {held} held")]
    InsufficientHoldings {
        symbol: Symbol,
        held: Decimal,
        requested: Decimal,
    },
    #[error("holding {user}/{symbol} kept changing, retry the request")]
    HoldingContention { user: UserId, symbol: Symbol },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl GrantError {
    /// True when repeating the request with the same idempotency key may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GrantError::PriceUnavailable(_)
                | GrantError::HoldingContention { .. }
                | GrantError::Storage(_)
        )
    }
}

impl From<OracleError> for GrantError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(symbol) => GrantError::PriceUnavailable(symbol),
            OracleError::Storage(e) => GrantError::Storage(e),
        }
    }
}

/// Result of a successful `grant_reward` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantOutcome {
    pub record: RewardRecord,
    /// The key was already processed; `record` is the original, unchanged.
    pub replayed: bool,
    /// Post-persistence steps that failed. The record stands regardless and
    /// the derived state can be rebuilt by the reconciler.
    pub warnings: Vec<String>,
}

impl GrantOutcome {
    fn replay(record: RewardRecord) -> Self {
        Self {
            record,
            replayed: true,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewardEngine {
    repo: Arc<Repository>,
    oracle: Arc<dyn PriceOracle>,
    fees: FeeSchedule,
    guard: IdempotencyGuard,
    holdings: HoldingsAggregator,
}

impl RewardEngine {
    pub fn new(repo: Arc<Repository>, oracle: Arc<dyn PriceOracle>, fees: FeeSchedule) -> Self {
        Self {
            guard: IdempotencyGuard::new(repo.clone()),
            holdings: HoldingsAggregator::new(repo.clone()),
            repo,
            oracle,
            fees,
        }
    }

    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Grant (or reverse) a reward exactly once per idempotency key.
    ///
    /// A key seen before short-circuits to the stored record with no pricing,
    /// fee computation or holdings change. Otherwise the request is validated,
    /// priced, persisted, applied to the holding and posted to the ledger, in
    /// that order. Failures after persistence are reported as warnings.
    ///
    /// A reversal is persisted together with its holding decrement, so a
    /// reversal that loses a race for the same units leaves no record.
    ///
    /// # Errors
    /// Any [`GrantError`], always before the record is persisted.
    pub async fn grant_reward(&self, request: &GrantRequest) -> Result<GrantOutcome, GrantError> {
        let key = request.idempotency_key.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyIdempotencyKey.into());
        }

        if let Admission::Replay(existing) = self.guard.admit_or_replay(key).await? {
            log_replay(&existing, request);
            return Ok(GrantOutcome::replay(existing));
        }

        let grant = request.validate()?;

        let instrument = self.repo.get_instrument(&grant.symbol).await?;
        if !instrument.map(|i| i.is_active).unwrap_or(false) {
            return Err(GrantError::InstrumentInactiveOrUnknown(grant.symbol));
        }

        let persisted = match grant.kind {
            RewardKind::Grant => self.persist_grant(&grant).await?,
            RewardKind::Reversal => self.persist_reversal(&grant).await?,
        };
        let record = match persisted {
            Persisted::New(record) => record,
            Persisted::Existing(existing) => {
                log_replay(&existing, request);
                return Ok(GrantOutcome::replay(existing));
            }
        };

        info!(
            reward_id = %record.reward_id,
            idempotency_key = %record.idempotency_key,
            user = %record.user,
            symbol = %record.symbol,
            kind = %record.kind,
            quantity = %record.quantity,
            price = %record.price_per_unit,
            total_cost = %record.total_cost,
            "Reward recorded"
        );

        let mut warnings = Vec::new();

        if record.kind == RewardKind::Grant {
            if let Err(e) = self
                .holdings
                .apply_grant(
                    &record.user,
                    &record.symbol,
                    record.quantity,
                    record.price_per_unit,
                )
                .await
            {
                log_post_persistence_failure(&record, "holdings", &e);
                warnings.push(format!("holdings update failed: {}", e));
            }
        }

        let postings = build_postings(&record, TimeMs::now());
        if let Err(e) = self.repo.insert_postings(&postings).await {
            log_post_persistence_failure(&record, "ledger", &e);
            warnings.push(format!("ledger posting failed: {}", e));
        }

        Ok(GrantOutcome {
            record,
            replayed: false,
            warnings,
        })
    }

    /// Price a grant at the oracle and claim its idempotency key.
    async fn persist_grant(&self, grant: &ValidGrant) -> Result<Persisted, GrantError> {
        let price = self
            .oracle
            .current_price(&grant.symbol)
            .await?
            .round_half_up(MONEY_DP);
        if !price.is_positive() {
            return Err(ValidationError::NonPositivePrice(price).into());
        }

        let record = build_record(grant, price, &self.fees, TimeMs::now())?;
        Ok(match self.guard.commit(&record).await? {
            Admission::Admitted => Persisted::New(record),
            Admission::Replay(existing) => Persisted::Existing(existing),
        })
    }

    /// Take units back at the position's running average.
    ///
    /// Each attempt reads the holding, prices the reversal from it and
    /// commits the decrement and the record in one transaction guarded by
    /// the holding version. A moved holding is retried against the fresh row.
    async fn persist_reversal(&self, grant: &ValidGrant) -> Result<Persisted, GrantError> {
        let repo = &*self.repo;
        let fees = &self.fees;

        retry(self.holdings.backoff(), move || async move {
            let holding = repo
                .get_holding(&grant.user, &grant.symbol)
                .await
                .map_err(|e| backoff::Error::permanent(GrantError::from(e)))?;

            let current = match holding {
                Some(h) if h.total_quantity >= grant.quantity && h.average_cost.is_positive() => h,
                other => {
                    return Err(backoff::Error::permanent(insufficient(
                        grant,
                        other.map(|h| h.total_quantity).unwrap_or_default(),
                    )))
                }
            };

            let now = TimeMs::now();
            let price = current.average_cost.round_half_up(MONEY_DP);
            let record = build_record(grant, price, fees, now)
                .map_err(|e| backoff::Error::permanent(GrantError::from(e)))?;
            let next = apply_to_position(
                Some(&current),
                &grant.user,
                &grant.symbol,
                record.quantity,
                price,
                now,
            )
            .map_err(|_| backoff::Error::permanent(insufficient(grant, current.total_quantity)))?;

            let outcome = repo
                .commit_reversal(&record, &next, current.version)
                .await
                .map_err(|e| backoff::Error::permanent(GrantError::from(e)))?;

            match outcome {
                ReversalCommit::Committed => Ok(Persisted::New(record)),
                ReversalCommit::KeyTaken => repo
                    .get_reward_by_key(&grant.idempotency_key)
                    .await
                    .map_err(|e| backoff::Error::permanent(GrantError::from(e)))?
                    .map(Persisted::Existing)
                    .ok_or_else(|| {
                        backoff::Error::permanent(GrantError::Storage(sqlx::Error::RowNotFound))
                    }),
                ReversalCommit::HoldingChanged => {
                    debug!(
                        user = %grant.user,
                        symbol = %grant.symbol,
                        "Holding changed under reversal, retrying"
                    );
                    Err(backoff::Error::transient(GrantError::HoldingContention {
                        user: grant.user.clone(),
                        symbol: grant.symbol.clone(),
                    }))
                }
            }
        })
        .await
    }
}

/// A freshly written record, or the one that already owned the key.
enum Persisted {
    New(RewardRecord),
    Existing(RewardRecord),
}

fn insufficient(grant: &ValidGrant, held: Decimal) -> GrantError {
    GrantError::InsufficientHoldings {
        symbol: grant.symbol.clone(),
        held,
        requested: grant.quantity,
    }
}

/// Assemble the record for `grant` at `price`. Grants pay fees on the gross
/// value; reversals carry none.
///
/// # Errors
/// `ValueOverflow` when an amount leaves the decimal range, `ZeroValue` when
/// the gross value rounds to zero.
fn build_record(
    grant: &ValidGrant,
    price: Decimal,
    schedule: &FeeSchedule,
    now: TimeMs,
) -> Result<RewardRecord, ValidationError> {
    let overflow = || ValidationError::ValueOverflow {
        quantity: grant.quantity,
        price,
    };

    let reward_id = Uuid::new_v4();
    let quantity = grant.signed_quantity();
    let gross_value = quantity
        .checked_mul(price)
        .ok_or_else(overflow)?
        .round_half_up(MONEY_DP);
    if gross_value.is_zero() {
        return Err(ValidationError::ZeroValue {
            quantity: grant.quantity,
            price,
        });
    }

    let fees = match grant.kind {
        RewardKind::Grant => compute_fees(gross_value, schedule).ok_or_else(overflow)?,
        RewardKind::Reversal => FeeBreakdown::zero(),
    };
    let total_cost = gross_value.checked_add(fees.total).ok_or_else(overflow)?;

    Ok(RewardRecord {
        reward_id,
        idempotency_key: grant.idempotency_key.clone(),
        user: grant.user.clone(),
        symbol: grant.symbol.clone(),
        kind: grant.kind,
        quantity,
        price_per_unit: price,
        gross_value,
        fees,
        total_cost,
        reason: grant.reason.clone(),
        metadata: grant.metadata.clone(),
        granted_at: grant.granted_at.unwrap_or(now),
        recorded_at: now,
        posting_group_id: RewardRecord::posting_group_for(&reward_id),
        request_fingerprint: grant.fingerprint.clone(),
    })
}

fn log_replay(existing: &RewardRecord, request: &GrantRequest) {
    let same_payload = request
        .validate()
        .map(|g| g.fingerprint == existing.request_fingerprint)
        .unwrap_or(false);

    if same_payload {
        info!(
            idempotency_key = %existing.idempotency_key,
            reward_id = %existing.reward_id,
            "Idempotent replay, returning stored reward"
        );
    } else {
        warn!(
            idempotency_key = %existing.idempotency_key,
            reward_id = %existing.reward_id,
            "Idempotency key reused with a different payload, returning stored reward"
        );
    }
}

fn log_post_persistence_failure(record: &RewardRecord, step: &str, err: &dyn std::fmt::Display) {
    error!(
        reward_id = %record.reward_id,
        posting_group_id = %record.posting_group_id,
        user = %record.user,
        symbol = %record.symbol,
        step,
        error = %err,
        "Post-persistence step failed, reward stands and needs reconciliation"
    );
}
