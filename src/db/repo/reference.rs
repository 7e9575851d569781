//! Instrument reference data and the price series.

use crate::domain::{Decimal, Instrument, PriceSnapshot, Symbol, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;

use super::{parse_decimal, Repository};

fn row_to_instrument(row: &SqliteRow) -> Instrument {
    Instrument {
        symbol: Symbol::new(row.get("symbol")),
        display_name: row.get("display_name"),
        venue: row.get("venue"),
        is_active: row.get::<i64, _>("is_active") != 0,
    }
}

impl Repository {
    pub async fn get_instrument(&self, symbol: &Symbol) -> Result<Option<Instrument>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT symbol, display_name, venue, is_active FROM instruments WHERE symbol = ?",
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_instrument))
    }

    /// Instruments that can currently be rewarded, ordered by symbol.
    pub async fn list_active_instruments(&self) -> Result<Vec<Instrument>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, display_name, venue, is_active
            FROM instruments
            WHERE is_active = 1
            ORDER BY symbol ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_instrument).collect())
    }

    pub async fn upsert_instrument(&self, instrument: &Instrument) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO instruments (symbol, display_name, venue, is_active)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                display_name = excluded.display_name,
                venue = excluded.venue,
                is_active = excluded.is_active
            "#,
        )
        .bind(instrument.symbol.as_str())
        .bind(&instrument.display_name)
        .bind(&instrument.venue)
        .bind(instrument.is_active as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a price observation. A second observation at the same
    /// timestamp replaces the first.
    pub async fn insert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO price_snapshots (symbol, price, time_ms, source)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol, time_ms) DO UPDATE SET
                price = excluded.price,
                source = excluded.source
            "#,
        )
        .bind(snapshot.symbol.as_str())
        .bind(snapshot.price.to_canonical_string())
        .bind(snapshot.time_ms.as_ms())
        .bind(&snapshot.source)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent snapshot for a symbol.
    pub async fn latest_price(&self, symbol: &Symbol) -> Result<Option<PriceSnapshot>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT symbol, price, time_ms, source
            FROM price_snapshots
            WHERE symbol = ?
            ORDER BY time_ms DESC
            LIMIT 1
            "#,
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PriceSnapshot {
            symbol: Symbol::new(row.get("symbol")),
            price: parse_decimal("price", &row.get::<String, _>("price")),
            time_ms: TimeMs::new(row.get("time_ms")),
            source: row.get("source"),
        }))
    }

    /// Latest price of every symbol that has at least one snapshot.
    pub async fn latest_prices(&self) -> Result<HashMap<Symbol, Decimal>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT p.symbol, p.price
            FROM price_snapshots p
            JOIN (
                SELECT symbol, MAX(time_ms) AS max_time
                FROM price_snapshots
                GROUP BY symbol
            ) latest ON latest.symbol = p.symbol AND latest.max_time = p.time_ms
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    Symbol::new(row.get("symbol")),
                    parse_decimal("price", &row.get::<String, _>("price")),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use std::str::FromStr;

    fn snapshot(symbol: &str, price: &str, t: i64) -> PriceSnapshot {
        PriceSnapshot {
            symbol: Symbol::new(symbol.to_string()),
            price: Decimal::from_str(price).unwrap(),
            time_ms: TimeMs::new(t),
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_seeded_instruments_and_deactivation() {
        let (repo, _temp) = setup_test_db().await;
        assert_eq!(repo.list_active_instruments().await.unwrap().len(), 10);

        let mut wipro = repo
            .get_instrument(&Symbol::new("WIPRO".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert!(wipro.is_active);
        wipro.is_active = false;
        repo.upsert_instrument(&wipro).await.unwrap();

        let active = repo.list_active_instruments().await.unwrap();
        assert_eq!(active.len(), 9);
        assert!(active.iter().all(|i| i.symbol.as_str() != "WIPRO"));
        assert!(repo
            .get_instrument(&Symbol::new("NOPE".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_latest_price_per_symbol() {
        let (repo, _temp) = setup_test_db().await;
        repo.insert_price_snapshot(&snapshot("TCS", "3400", 1)).await.unwrap();
        repo.insert_price_snapshot(&snapshot("TCS", "3500", 5)).await.unwrap();
        repo.insert_price_snapshot(&snapshot("TCS", "3450", 3)).await.unwrap();
        repo.insert_price_snapshot(&snapshot("INFY", "1500", 2)).await.unwrap();
        // Same timestamp replaces the earlier observation.
        repo.insert_price_snapshot(&snapshot("INFY", "1510", 2)).await.unwrap();

        let tcs = repo
            .latest_price(&Symbol::new("TCS".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tcs.price, Decimal::from_str("3500").unwrap());
        assert_eq!(tcs.time_ms, TimeMs::new(5));

        let all = repo.latest_prices().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[&Symbol::new("INFY".to_string())],
            Decimal::from_str("1510").unwrap()
        );
        assert!(repo
            .latest_price(&Symbol::new("ITC".to_string()))
            .await
            .unwrap()
            .is_none());
    }
}
