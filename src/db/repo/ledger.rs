//! Ledger postings.

use crate::domain::{AccountType, LedgerPosting, Symbol, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use super::{parse_decimal, Repository};

fn row_to_posting(row: &SqliteRow) -> LedgerPosting {
    let account_str: String = row.get("account_type");
    let account_type = AccountType::from_str(&account_str).unwrap_or_else(|e| {
        warn!(error = %e, "Unknown account type in ledger, using cash_outflow");
        AccountType::CashOutflow
    });
    let reward_id_str: String = row.get("reward_id");

    LedgerPosting {
        posting_group_id: row.get("posting_group_id"),
        leg: row.get("leg"),
        reward_id: Uuid::parse_str(&reward_id_str).unwrap_or_else(|e| {
            warn!(reward_id = %reward_id_str, error = %e, "Failed to parse reward id, using nil");
            Uuid::nil()
        }),
        account_type,
        symbol: row.get::<Option<String>, _>("symbol").map(Symbol::new),
        debit_amount: parse_decimal("debit_amount", &row.get::<String, _>("debit_amount")),
        credit_amount: parse_decimal("credit_amount", &row.get::<String, _>("credit_amount")),
        description: row.get("description"),
        created_at: TimeMs::new(row.get("created_at_ms")),
    }
}

impl Repository {
    /// Write every leg of a posting group in one transaction.
    ///
    /// Legs already present (same group and leg index) are left untouched, so
    /// re-posting a group is a no-op. Returns the number of legs written.
    pub async fn insert_postings(&self, postings: &[LedgerPosting]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for p in postings {
            let result = sqlx::query(
                r#"
                INSERT INTO ledger_postings (
                    posting_group_id, leg, reward_id, account_type, symbol,
                    debit_amount, credit_amount, description, created_at_ms
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(posting_group_id, leg) DO NOTHING
                "#,
            )
            .bind(&p.posting_group_id)
            .bind(p.leg)
            .bind(p.reward_id.to_string())
            .bind(p.account_type.as_str())
            .bind(p.symbol.as_ref().map(|s| s.as_str()))
            .bind(p.debit_amount.to_canonical_string())
            .bind(p.credit_amount.to_canonical_string())
            .bind(&p.description)
            .bind(p.created_at.as_ms())
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Every leg of a posting group, in leg order.
    pub async fn query_postings(
        &self,
        posting_group_id: &str,
    ) -> Result<Vec<LedgerPosting>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT posting_group_id, leg, reward_id, account_type, symbol,
                   debit_amount, credit_amount, description, created_at_ms
            FROM ledger_postings
            WHERE posting_group_id = ?
            ORDER BY leg ASC
            "#,
        )
        .bind(posting_group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_posting).collect())
    }
}
