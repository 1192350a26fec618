use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

use crate::db::models::{HistoryRow, ReportRow, SnapshotRow};
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::types::{cutoff_ms, HistoryPoint, MarketSnapshot, Report};

const UPSERT_SNAPSHOT: &str = r#"
    INSERT INTO markets (
        market_id, question, category, current_price,
        previous_price_1h, previous_price_24h,
        volume_24h, volume_average, liquidity, observed_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(market_id) DO UPDATE SET
        question = excluded.question,
        category = excluded.category,
        current_price = excluded.current_price,
        previous_price_1h = excluded.previous_price_1h,
        previous_price_24h = excluded.previous_price_24h,
        volume_24h = excluded.volume_24h,
        volume_average = excluded.volume_average,
        liquidity = excluded.liquidity,
        observed_at = excluded.observed_at
"#;

const INSERT_HISTORY: &str = r#"
    INSERT INTO market_history (market_id, price, volume, timestamp)
    VALUES (?, ?, ?, ?)
"#;

const SELECT_REPORT_COLUMNS: &str = r#"
    SELECT id, market_id, headline, summary, analysis, key_takeaways, reasons,
           confidence, price_change, volume_change, created_at, event_at
    FROM news_reports
"#;

/// SQLite-backed snapshot store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!("Database ready at {path}");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn upsert_query(snapshot: &MarketSnapshot) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        sqlx::query(UPSERT_SNAPSHOT)
            .bind(&snapshot.market_id)
            .bind(&snapshot.question)
            .bind(snapshot.category.as_str())
            .bind(snapshot.current_price)
            .bind(snapshot.previous_price_1h)
            .bind(snapshot.previous_price_24h)
            .bind(snapshot.volume_24h)
            .bind(snapshot.volume_average)
            .bind(snapshot.liquidity)
            .bind(snapshot.observed_at_ms)
    }

    fn history_query(point: &HistoryPoint) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        sqlx::query(INSERT_HISTORY)
            .bind(&point.market_id)
            .bind(point.price)
            .bind(point.volume)
            .bind(point.timestamp_ms)
    }
}

/// Rows that fail to decode are skipped rather than failing the whole read.
fn decode_reports(rows: Vec<ReportRow>) -> Vec<Report> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match row.into_report() {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(report_id = id, "skipping malformed report row: {e}");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()> {
        Self::upsert_query(snapshot).execute(&self.pool).await?;
        Ok(())
    }

    async fn append_history(&self, point: &HistoryPoint) -> Result<()> {
        Self::history_query(point).execute(&self.pool).await?;
        Ok(())
    }

    async fn record_observation(&self, snapshot: &MarketSnapshot, point: &HistoryPoint) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_query(snapshot).execute(&mut *tx).await?;
        Self::history_query(point).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_snapshot(&self, market_id: &str) -> Result<Option<MarketSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>("SELECT * FROM markets WHERE market_id = ?")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MarketSnapshot::from))
    }

    async fn list_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT * FROM markets ORDER BY observed_at DESC, market_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MarketSnapshot::from).collect())
    }

    async fn query_history(&self, market_id: &str, since: Duration) -> Result<Vec<HistoryPoint>> {
        let cutoff = cutoff_ms(since);
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT market_id, price, volume, timestamp
            FROM market_history
            WHERE market_id = ? AND timestamp > ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(market_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HistoryPoint::from).collect())
    }

    async fn insert_report(&self, report: &Report) -> Result<i64> {
        let reasons = serde_json::to_string(&report.reasons)?;
        let result = sqlx::query(
            r#"
            INSERT INTO news_reports (
                market_id, headline, summary, analysis, key_takeaways, reasons,
                confidence, price_change, volume_change, created_at, event_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.market_id)
        .bind(&report.headline)
        .bind(&report.summary)
        .bind(&report.analysis)
        .bind(&report.key_takeaways)
        .bind(reasons)
        .bind(report.confidence)
        .bind(report.price_change)
        .bind(report.volume_change)
        .bind(report.created_at_ms)
        .bind(report.event_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_recent_reports(&self, market_id: &str, since: Duration) -> Result<Vec<Report>> {
        let cutoff = cutoff_ms(since);
        let sql = format!(
            "{SELECT_REPORT_COLUMNS} WHERE market_id = ? AND event_at > ? ORDER BY event_at DESC"
        );
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(market_id)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_reports(rows))
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<Report>> {
        let sql = format!("{SELECT_REPORT_COLUMNS} ORDER BY event_at DESC, id DESC LIMIT ?");
        let rows = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(decode_reports(rows))
    }

    async fn purge_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM news_reports").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM market_history").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM markets").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_ms, Category};

    async fn store() -> SqliteStore {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        let store = SqliteStore::from_pool(pool);
        store.migrate().await.expect("migrations");
        store
    }

    fn snapshot(id: &str, price: f64, observed_at_ms: i64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: id.to_string(),
            question: format!("Will {id} happen?"),
            category: Category::WorldEvents,
            current_price: price,
            previous_price_1h: Some(0.4),
            previous_price_24h: None,
            volume_24h: 12_000.0,
            volume_average: 9_000.0,
            liquidity: 3_000.0,
            observed_at_ms,
        }
    }

    fn report(market_id: &str, event_at_ms: i64) -> Report {
        Report {
            id: None,
            market_id: market_id.to_string(),
            headline: "Odds jump".to_string(),
            summary: "Summary".to_string(),
            analysis: "Analysis".to_string(),
            key_takeaways: "• One".to_string(),
            reasons: vec!["Price moved 30.0% in the last hour".to_string()],
            confidence: 0.85,
            price_change: 0.3,
            volume_change: 1.5,
            created_at_ms: event_at_ms,
            event_at_ms,
        }
    }

    #[tokio::test]
    async fn snapshot_upsert_overwrites() {
        let store = store().await;
        let now = now_ms();
        store.upsert_snapshot(&snapshot("a", 0.5, now)).await.unwrap();
        store.upsert_snapshot(&snapshot("a", 0.7, now + 1)).await.unwrap();

        let loaded = store.get_snapshot("a").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot("a", 0.7, now + 1));
        assert_eq!(loaded.category, Category::WorldEvents);
        assert_eq!(store.list_snapshots().await.unwrap().len(), 1);
        assert!(store.get_snapshot("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn observation_writes_snapshot_and_history_together() {
        let store = store().await;
        let now = now_ms();
        let snap = snapshot("a", 0.55, now);
        let point = HistoryPoint {
            market_id: "a".to_string(),
            price: 0.55,
            volume: 12_000.0,
            timestamp_ms: now,
        };
        store.record_observation(&snap, &point).await.unwrap();

        assert!(store.get_snapshot("a").await.unwrap().is_some());
        assert_eq!(
            store.query_history("a", Duration::from_secs(60)).await.unwrap(),
            vec![point]
        );
    }

    #[tokio::test]
    async fn history_is_windowed_and_ascending() {
        let store = store().await;
        let now = now_ms();
        for (offset_min, price) in [(10, 0.3), (200, 0.1), (30, 0.2)] {
            store
                .append_history(&HistoryPoint {
                    market_id: "a".to_string(),
                    price,
                    volume: 1.0,
                    timestamp_ms: now - offset_min * 60_000,
                })
                .await
                .unwrap();
        }
        let points = store.query_history("a", Duration::from_secs(3600)).await.unwrap();
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![0.2, 0.3]);
        assert!(store.query_history("b", Duration::from_secs(3600)).await.unwrap().is_empty());

        // An oversized window saturates instead of overflowing the cutoff.
        let everything = store.query_history("a", Duration::MAX).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn reports_round_trip_and_filter_by_market_and_age() {
        let store = store().await;
        let now = now_ms();
        let id = store.insert_report(&report("a", now - 1_000)).await.unwrap();
        store.insert_report(&report("a", now - 48 * 3_600_000)).await.unwrap();
        store.insert_report(&report("b", now)).await.unwrap();

        let recent = store
            .list_recent_reports("a", Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, Some(id));
        assert_eq!(recent[0].reasons, report("a", 0).reasons);

        let all = store.list_reports(10).await.unwrap();
        let markets: Vec<&str> = all.iter().map(|r| r.market_id.as_str()).collect();
        assert_eq!(markets, vec!["b", "a", "a"]);
        assert_eq!(store.list_reports(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_clears_everything() {
        let store = store().await;
        let now = now_ms();
        let snap = snapshot("a", 0.5, now);
        let point = HistoryPoint {
            market_id: "a".to_string(),
            price: 0.5,
            volume: 1.0,
            timestamp_ms: now,
        };
        store.record_observation(&snap, &point).await.unwrap();
        store.insert_report(&report("a", now)).await.unwrap();

        store.purge_all().await.unwrap();

        assert!(store.list_snapshots().await.unwrap().is_empty());
        assert!(store.query_history("a", Duration::from_secs(60)).await.unwrap().is_empty());
        assert!(store.list_reports(10).await.unwrap().is_empty());
    }
}
