//! Schema setup and reference data for the reward database.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

/// Instruments every fresh database starts with: (symbol, display name).
/// All trade on NSE and start active.
const REFERENCE_INSTRUMENTS: &[(&str, &str)] = &[
    ("RELIANCE", "Reliance Industries Ltd"),
    ("TCS", "Tata Consultancy Services Ltd"),
    ("INFY", "Infosys Ltd"),
    ("HDFCBANK", "HDFC Bank Ltd"),
    ("ICICIBANK", "ICICI Bank Ltd"),
    ("HINDUNILVR", "Hindustan Unilever Ltd"),
    ("ITC", "ITC Ltd"),
    ("BHARTIARTL", "Bharti Airtel Ltd"),
    ("KOTAKBANK", "Kotak Mahindra Bank Ltd"),
    ("WIPRO", "Wipro Ltd"),
];

const REFERENCE_VENUE: &str = "NSE";

/// Open (creating if needed) the database at `db_path`, apply the schema and
/// seed the reference instruments.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .after_connect(|conn, _meta| Box::pin(async move { configure_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;
    let seeded = seed_reference_instruments(&pool).await?;

    info!(db_path = %db_path, seeded, "Database initialized");
    Ok(pool)
}

/// Apply the embedded schema. Every statement is `IF NOT EXISTS`.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in include_str!("schema.sql").split(';') {
        let sql = strip_comments(statement);
        if !sql.is_empty() {
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    debug!("Schema applied");
    Ok(())
}

/// Insert any reference instrument that is missing. Existing rows, including
/// ones an operator deactivated, are left alone. Returns the number inserted.
async fn seed_reference_instruments(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for &(symbol, display_name) in REFERENCE_INSTRUMENTS {
        inserted += sqlx::query(
            "INSERT OR IGNORE INTO instruments (symbol, display_name, venue, is_active) VALUES (?, ?, ?, 1)",
        )
        .bind(symbol)
        .bind(display_name)
        .bind(REFERENCE_VENUE)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

fn strip_comments(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Per-connection settings: foreign keys for the ledger, WAL so queries
/// read while grants write, and a busy timeout for contended writers.
async fn configure_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!(journal_mode = %journal_mode, "SQLite journal_mode set");

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_pool() -> (SqlitePool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("rewards.db");
        let pool = init_db(&db_path.to_string_lossy()).await.expect("init_db failed");
        (pool, temp_dir)
    }

    #[tokio::test]
    async fn test_schema_has_reward_tables() {
        let (pool, _temp) = fresh_pool().await;

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "holdings",
                "instruments",
                "ledger_postings",
                "price_snapshots",
                "reward_records"
            ]
        );
    }

    #[tokio::test]
    async fn test_reseeding_keeps_deactivated_instruments() {
        let (pool, _temp) = fresh_pool().await;

        sqlx::query("UPDATE instruments SET is_active = 0 WHERE symbol = 'ITC'")
            .execute(&pool)
            .await
            .unwrap();

        apply_schema(&pool).await.unwrap();
        assert_eq!(seed_reference_instruments(&pool).await.unwrap(), 0);

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM instruments WHERE is_active = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(active, REFERENCE_INSTRUMENTS.len() as i64 - 1);
    }

    #[tokio::test]
    async fn test_connections_enforce_foreign_keys() {
        let (pool, _temp) = fresh_pool().await;

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);

        let busy_timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }

    #[test]
    fn test_strip_comments() {
        let sql = "-- header\nCREATE TABLE t (a INT)\n";
        assert_eq!(strip_comments(sql), "CREATE TABLE t (a INT)");
        assert_eq!(strip_comments("\n-- only a comment\n"), "");
    }
}
