//! Holding positions. Writers coordinate through the `version` column.

use crate::domain::{HoldingPosition, Symbol, TimeMs, UserId};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;

use super::{parse_decimal, Repository};

fn row_to_holding(row: &SqliteRow) -> HoldingPosition {
    HoldingPosition {
        user: UserId::new(row.get("user_id")),
        symbol: Symbol::new(row.get("symbol")),
        total_quantity: parse_decimal("total_quantity", &row.get::<String, _>("total_quantity")),
        average_cost: parse_decimal("average_cost", &row.get::<String, _>("average_cost")),
        last_updated: TimeMs::new(row.get("last_updated_ms")),
        version: row.get("version"),
    }
}

/// Conditional update of a position, matching only `expected_version`.
pub(super) fn holding_cas(
    position: &HoldingPosition,
    expected_version: i64,
) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        UPDATE holdings
        SET total_quantity = ?, average_cost = ?, last_updated_ms = ?, version = ?
        WHERE user_id = ? AND symbol = ? AND version = ?
        "#,
    )
    .bind(position.total_quantity.to_canonical_string())
    .bind(position.average_cost.to_canonical_string())
    .bind(position.last_updated.as_ms())
    .bind(position.version)
    .bind(position.user.as_str())
    .bind(position.symbol.as_str())
    .bind(expected_version)
}

impl Repository {
    /// Get the current position for a (user, symbol) pair.
    pub async fn get_holding(
        &self,
        user: &UserId,
        symbol: &Symbol,
    ) -> Result<Option<HoldingPosition>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, symbol, total_quantity, average_cost, last_updated_ms, version
            FROM holdings
            WHERE user_id = ? AND symbol = ?
            "#,
        )
        .bind(user.as_str())
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_holding))
    }

    /// Create the first position for a pair.
    ///
    /// Returns `false` if a concurrent writer created it first.
    pub async fn insert_holding_if_absent(
        &self,
        position: &HoldingPosition,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO holdings (user_id, symbol, total_quantity, average_cost, last_updated_ms, version)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, symbol) DO NOTHING
            "#,
        )
        .bind(position.user.as_str())
        .bind(position.symbol.as_str())
        .bind(position.total_quantity.to_canonical_string())
        .bind(position.average_cost.to_canonical_string())
        .bind(position.last_updated.as_ms())
        .bind(position.version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace a position only if its stored version still equals `expected_version`.
    ///
    /// Returns `false` when another writer got there first; the caller re-reads
    /// and retries.
    pub async fn update_holding_cas(
        &self,
        position: &HoldingPosition,
        expected_version: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = holding_cas(position, expected_version)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unconditionally write a position, keeping the version monotonic.
    ///
    /// Used when rebuilding positions from the reward records.
    pub async fn overwrite_holding(&self, position: &HoldingPosition) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO holdings (user_id, symbol, total_quantity, average_cost, last_updated_ms, version)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, symbol) DO UPDATE SET
                total_quantity = excluded.total_quantity,
                average_cost = excluded.average_cost,
                last_updated_ms = excluded.last_updated_ms,
                version = MAX(holdings.version + 1, excluded.version)
            "#,
        )
        .bind(position.user.as_str())
        .bind(position.symbol.as_str())
        .bind(position.total_quantity.to_canonical_string())
        .bind(position.average_cost.to_canonical_string())
        .bind(position.last_updated.as_ms())
        .bind(position.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Non-empty positions of a user, ordered by symbol.
    pub async fn query_holdings(&self, user: &UserId) -> Result<Vec<HoldingPosition>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, symbol, total_quantity, average_cost, last_updated_ms, version
            FROM holdings
            WHERE user_id = ?
            ORDER BY symbol ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        // Quantities are TEXT, so the zero filter happens after parsing.
        Ok(rows
            .iter()
            .map(row_to_holding)
            .filter(|h| !h.is_empty())
            .collect())
    }
}
