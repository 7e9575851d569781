//! Reward record operations. Records are only ever inserted and read.

use crate::domain::{FeeBreakdown, HoldingPosition, RewardKind, RewardRecord, Symbol, TimeMs, UserId};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use super::holdings::holding_cas;
use super::{parse_decimal, Repository};

const REWARD_COLUMNS: &str = r#"
    reward_id, idempotency_key, user_id, symbol, kind, quantity, price_per_unit,
    gross_value, brokerage_fee, transaction_tax, tax_on_brokerage, exchange_fee,
    regulatory_fee, total_fees, total_cost, reason, metadata, granted_at_ms,
    recorded_at_ms, posting_group_id, request_fingerprint
"#;

fn row_to_record(row: &SqliteRow) -> RewardRecord {
    let reward_id_str: String = row.get("reward_id");
    let reward_id = Uuid::parse_str(&reward_id_str).unwrap_or_else(|e| {
        warn!(reward_id = %reward_id_str, error = %e, "Failed to parse reward id, using nil");
        Uuid::nil()
    });

    let kind_str: String = row.get("kind");
    let kind = RewardKind::from_str(&kind_str).unwrap_or_else(|e| {
        warn!(reward_id = %reward_id, error = %e, "Unknown reward kind, treating as grant");
        RewardKind::Grant
    });

    let metadata = row
        .get::<Option<String>, _>("metadata")
        .and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(reward_id = %reward_id, error = %e, "Stored metadata is not valid JSON");
                None
            }
        });

    let dec = |column: &str| parse_decimal(column, &row.get::<String, _>(column));

    RewardRecord {
        reward_id,
        idempotency_key: row.get("idempotency_key"),
        user: UserId::new(row.get("user_id")),
        symbol: Symbol::new(row.get("symbol")),
        kind,
        quantity: dec("quantity"),
        price_per_unit: dec("price_per_unit"),
        gross_value: dec("gross_value"),
        fees: FeeBreakdown {
            brokerage: dec("brokerage_fee"),
            transaction_tax: dec("transaction_tax"),
            tax_on_brokerage: dec("tax_on_brokerage"),
            exchange_fee: dec("exchange_fee"),
            regulatory_fee: dec("regulatory_fee"),
            total: dec("total_fees"),
        },
        total_cost: dec("total_cost"),
        reason: row.get("reason"),
        metadata,
        granted_at: TimeMs::new(row.get("granted_at_ms")),
        recorded_at: TimeMs::new(row.get("recorded_at_ms")),
        posting_group_id: row.get("posting_group_id"),
        request_fingerprint: row.get("request_fingerprint"),
    }
}

/// Outcome of [`Repository::commit_reversal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReversalCommit {
    /// Holding decremented and record inserted together.
    Committed,
    /// The holding moved past `expected_version`; nothing was written.
    HoldingChanged,
    /// Another record owns the idempotency key; nothing was written.
    KeyTaken,
}

fn reward_insert(record: &RewardRecord) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    let f = &record.fees;
    let metadata = record.metadata.as_ref().map(|m| m.to_string());

    sqlx::query(
        r#"
        INSERT INTO reward_records (
            reward_id, idempotency_key, user_id, symbol, kind, quantity, price_per_unit,
            gross_value, brokerage_fee, transaction_tax, tax_on_brokerage, exchange_fee,
            regulatory_fee, total_fees, total_cost, reason, metadata, granted_at_ms,
            recorded_at_ms, posting_group_id, request_fingerprint
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(idempotency_key) DO NOTHING
        "#,
    )
    .bind(record.reward_id.to_string())
    .bind(&record.idempotency_key)
    .bind(record.user.as_str())
    .bind(record.symbol.as_str())
    .bind(record.kind.as_str())
    .bind(record.quantity.to_canonical_string())
    .bind(record.price_per_unit.to_canonical_string())
    .bind(record.gross_value.to_canonical_string())
    .bind(f.brokerage.to_canonical_string())
    .bind(f.transaction_tax.to_canonical_string())
    .bind(f.tax_on_brokerage.to_canonical_string())
    .bind(f.exchange_fee.to_canonical_string())
    .bind(f.regulatory_fee.to_canonical_string())
    .bind(f.total.to_canonical_string())
    .bind(record.total_cost.to_canonical_string())
    .bind(&record.reason)
    .bind(metadata)
    .bind(record.granted_at.as_ms())
    .bind(record.recorded_at.as_ms())
    .bind(&record.posting_group_id)
    .bind(&record.request_fingerprint)
}

impl Repository {
    /// Insert a reward record unless its idempotency key already exists.
    ///
    /// The uniqueness constraint on `idempotency_key` makes this the atomic
    /// check-and-insert: returns `false` when another record owns the key.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any other reason.
    pub async fn insert_reward(&self, record: &RewardRecord) -> Result<bool, sqlx::Error> {
        let result = reward_insert(record).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply `position` (a reduction) and insert the reversal `record` in
    /// one transaction. Either both land or neither does.
    ///
    /// The holding write goes first so the transaction takes the write lock
    /// before reading anything.
    pub async fn commit_reversal(
        &self,
        record: &RewardRecord,
        position: &HoldingPosition,
        expected_version: i64,
    ) -> Result<ReversalCommit, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated = holding_cas(position, expected_version)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReversalCommit::HoldingChanged);
        }

        let inserted = reward_insert(record).execute(&mut *tx).await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReversalCommit::KeyTaken);
        }

        tx.commit().await?;
        Ok(ReversalCommit::Committed)
    }

    /// Get the reward record owning an idempotency key.
    pub async fn get_reward_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<RewardRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM reward_records WHERE idempotency_key = ?",
            REWARD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_record))
    }

    /// Rewards for a user granted in `[from_ms, to_ms)`, newest first.
    pub async fn query_rewards(
        &self,
        user: &UserId,
        from_ms: TimeMs,
        to_ms: TimeMs,
    ) -> Result<Vec<RewardRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM reward_records
            WHERE user_id = ? AND granted_at_ms >= ? AND granted_at_ms < ?
            ORDER BY granted_at_ms DESC, seq DESC
            "#,
            REWARD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(from_ms.as_ms())
            .bind(to_ms.as_ms())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Every record for a (user, symbol) pair in insertion order.
    pub async fn query_rewards_for_pair(
        &self,
        user: &UserId,
        symbol: &Symbol,
    ) -> Result<Vec<RewardRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM reward_records WHERE user_id = ? AND symbol = ? ORDER BY seq ASC",
            REWARD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(symbol.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Distinct (user, symbol) pairs that have at least one record.
    pub async fn query_reward_pairs(&self) -> Result<Vec<(UserId, Symbol)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT DISTINCT user_id, symbol FROM reward_records ORDER BY user_id, symbol",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    UserId::new(row.get("user_id")),
                    Symbol::new(row.get("symbol")),
                )
            })
            .collect())
    }

    /// Records whose posting group has no ledger rows yet.
    pub async fn query_rewards_missing_postings(&self) -> Result<Vec<RewardRecord>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {} FROM reward_records r
            WHERE NOT EXISTS (
                SELECT 1 FROM ledger_postings lp WHERE lp.posting_group_id = r.posting_group_id
            )
            ORDER BY seq ASC
            "#,
            REWARD_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    /// Number of records for an idempotency key (0 or 1 by construction).
    pub async fn count_rewards_with_key(&self, idempotency_key: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM reward_records WHERE idempotency_key = ?")
            .bind(idempotency_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}
