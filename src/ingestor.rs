use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::history_windows::{
    LOOKBACK, PRICE_1H_END, PRICE_1H_START, PRICE_24H_END, PRICE_24H_START,
};
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::feed::FeedMarket;
use crate::types::{duration_ms, now_ms, HistoryPoint, MarketSnapshot};

// ---------------------------------------------------------------------------
// Enrichment (pure)
// ---------------------------------------------------------------------------

/// Price of the most recent point with timestamp in `(now - start, now - end]`.
pub fn reference_price(history: &[HistoryPoint], now_ms: i64, start: Duration, end: Duration) -> Option<f64> {
    let lower = now_ms.saturating_sub(duration_ms(start));
    let upper = now_ms.saturating_sub(duration_ms(end));
    history
        .iter()
        .filter(|p| p.timestamp_ms > lower && p.timestamp_ms <= upper)
        .max_by_key(|p| p.timestamp_ms)
        .map(|p| p.price)
}

/// Mean of the positive volumes in `history`, else `current`.
pub fn volume_average(history: &[HistoryPoint], current: f64) -> f64 {
    let (sum, n) = history
        .iter()
        .filter(|p| p.volume > 0.0)
        .fold((0.0, 0usize), |(s, n), p| (s + p.volume, n + 1));
    if n == 0 {
        current
    } else {
        sum / n as f64
    }
}

/// Build this cycle's snapshot from the feed record and prior history.
/// `history` must not contain the observation being made now.
pub fn enrich(market: &FeedMarket, history: &[HistoryPoint], now_ms: i64) -> MarketSnapshot {
    let volume_24h = market.volume_24h();
    MarketSnapshot {
        market_id: market.market_id.clone(),
        question: market.question.clone(),
        category: market.category,
        current_price: market.price,
        previous_price_1h: reference_price(history, now_ms, PRICE_1H_START, PRICE_1H_END),
        previous_price_24h: reference_price(history, now_ms, PRICE_24H_START, PRICE_24H_END),
        volume_24h,
        volume_average: volume_average(history, volume_24h),
        liquidity: market.liquidity,
        observed_at_ms: now_ms,
    }
}

// ---------------------------------------------------------------------------
// MarketIngestor
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// In feed order.
    pub snapshots: Vec<MarketSnapshot>,
    pub failed: usize,
}

/// Enriches feed records against stored history and persists each
/// observation. Runs up to `concurrency` markets at once.
pub struct MarketIngestor {
    store: Arc<dyn SnapshotStore>,
    concurrency: usize,
}

impl MarketIngestor {
    pub fn new(store: Arc<dyn SnapshotStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// A market that fails is logged and left out; the rest of the batch
    /// still completes.
    pub async fn ingest_batch(&self, markets: Vec<FeedMarket>) -> IngestOutcome {
        let total = markets.len();
        let results: Vec<(String, Result<MarketSnapshot>)> = stream::iter(markets)
            .map(|m| async move {
                let res = self.ingest_one(&m).await;
                (m.market_id, res)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = IngestOutcome::default();
        for (market_id, res) in results {
            match res {
                Ok(snap) => outcome.snapshots.push(snap),
                Err(e) => {
                    outcome.failed += 1;
                    warn!(market_id = %market_id, "Failed to ingest market: {e}");
                }
            }
        }
        info!(
            ingested = outcome.snapshots.len(),
            failed = outcome.failed,
            "Ingested {}/{} markets",
            outcome.snapshots.len(),
            total
        );
        outcome
    }

    async fn ingest_one(&self, market: &FeedMarket) -> Result<MarketSnapshot> {
        let history = self.store.query_history(&market.market_id, LOOKBACK).await?;
        let now = now_ms();
        let snapshot = enrich(market, &history, now);
        let point = HistoryPoint {
            market_id: snapshot.market_id.clone(),
            price: snapshot.current_price,
            volume: snapshot.volume_24h,
            timestamp_ms: now,
        };
        self.store.record_observation(&snapshot, &point).await?;
        debug!(
            market_id = %snapshot.market_id,
            price = snapshot.current_price,
            volume_24h = snapshot.volume_24h,
            history = history.len(),
            "Updated market: {:.1}% | ${:.1}k",
            snapshot.current_price * 100.0,
            snapshot.volume_24h / 1000.0
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::state::MemoryStore;
    use crate::types::{Category, Report};
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000_000;
    const MIN: i64 = 60_000;

    fn point(price: f64, volume: f64, minutes_ago: i64) -> HistoryPoint {
        HistoryPoint {
            market_id: "m1".to_string(),
            price,
            volume,
            timestamp_ms: NOW - minutes_ago * MIN,
        }
    }

    fn feed_market(id: &str, price: f64, volume: f64) -> FeedMarket {
        FeedMarket {
            market_id: id.to_string(),
            question: format!("Question {id}"),
            category: Category::Sports,
            price,
            volume_24hr: Some(volume),
            total_volume: None,
            liquidity: 500.0,
            active: true,
            archived: false,
            end_date_ms: None,
            created_at_ms: None,
        }
    }

    #[test]
    fn reference_windows_are_half_open() {
        let history = vec![
            point(0.10, 0.0, 90),       // excluded: lower bound is open
            point(0.20, 0.0, 60),
            point(0.30, 0.0, 30),       // included: upper bound is closed
            point(0.40, 0.0, 29),
            point(0.50, 0.0, 24 * 60 + 10),
        ];
        assert_eq!(
            reference_price(&history, NOW, PRICE_1H_START, PRICE_1H_END),
            Some(0.30)
        );
        assert_eq!(
            reference_price(&history, NOW, PRICE_24H_START, PRICE_24H_END),
            Some(0.50)
        );
        assert_eq!(reference_price(&[], NOW, PRICE_1H_START, PRICE_1H_END), None);
    }

    #[test]
    fn volume_average_ignores_empty_points() {
        let history = vec![point(0.5, 100.0, 10), point(0.5, 0.0, 20), point(0.5, 300.0, 30)];
        assert_eq!(volume_average(&history, 7.0), 200.0);
        assert_eq!(volume_average(&[point(0.5, 0.0, 5)], 7.0), 7.0);
    }

    #[test]
    fn enrich_without_history() {
        let snap = enrich(&feed_market("m1", 0.6, 25_000.0), &[], NOW);
        assert_eq!(snap.previous_price_1h, None);
        assert_eq!(snap.previous_price_24h, None);
        assert_eq!(snap.volume_average, 25_000.0);
        assert_eq!(snap.observed_at_ms, NOW);
        assert_eq!(snap.category, Category::Sports);
    }

    #[tokio::test]
    async fn batch_persists_in_feed_order() {
        let store = MemoryStore::new();
        let ingestor = MarketIngestor::new(store.clone(), 3);
        let batch: Vec<FeedMarket> = (0..8)
            .map(|i| feed_market(&format!("m{i}"), 0.5, 1_000.0 * i as f64))
            .collect();

        let outcome = ingestor.ingest_batch(batch).await;
        let ids: Vec<String> = outcome.snapshots.iter().map(|s| s.market_id.clone()).collect();
        assert_eq!(ids, (0..8).map(|i| format!("m{i}")).collect::<Vec<_>>());
        assert_eq!(outcome.failed, 0);
        assert_eq!(store.market_count(), 8);
        assert_eq!(
            store.query_history("m3", Duration::from_secs(60)).await.unwrap().len(),
            1
        );
    }

    /// Delegates to a MemoryStore but refuses writes for one market.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        broken: &'static str,
    }

    #[async_trait]
    impl SnapshotStore for FlakyStore {
        async fn upsert_snapshot(&self, s: &MarketSnapshot) -> Result<()> {
            self.inner.upsert_snapshot(s).await
        }
        async fn append_history(&self, p: &HistoryPoint) -> Result<()> {
            self.inner.append_history(p).await
        }
        async fn record_observation(&self, s: &MarketSnapshot, p: &HistoryPoint) -> Result<()> {
            if s.market_id == self.broken {
                return Err(AppError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.record_observation(s, p).await
        }
        async fn get_snapshot(&self, id: &str) -> Result<Option<MarketSnapshot>> {
            self.inner.get_snapshot(id).await
        }
        async fn list_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
            self.inner.list_snapshots().await
        }
        async fn query_history(&self, id: &str, since: Duration) -> Result<Vec<HistoryPoint>> {
            self.inner.query_history(id, since).await
        }
        async fn insert_report(&self, r: &Report) -> Result<i64> {
            self.inner.insert_report(r).await
        }
        async fn list_recent_reports(&self, id: &str, since: Duration) -> Result<Vec<Report>> {
            self.inner.list_recent_reports(id, since).await
        }
        async fn list_reports(&self, limit: usize) -> Result<Vec<Report>> {
            self.inner.list_reports(limit).await
        }
        async fn purge_all(&self) -> Result<()> {
            self.inner.purge_all().await
        }
    }

    #[tokio::test]
    async fn one_failing_market_does_not_sink_the_batch() {
        let inner = MemoryStore::new();
        let store = Arc::new(FlakyStore { inner: inner.clone(), broken: "m1" });
        let ingestor = MarketIngestor::new(store, 2);

        let outcome = ingestor
            .ingest_batch(vec![
                feed_market("m0", 0.5, 1.0),
                feed_market("m1", 0.5, 1.0),
                feed_market("m2", 0.5, 1.0),
            ])
            .await;

        assert_eq!(outcome.failed, 1);
        let ids: Vec<&str> = outcome.snapshots.iter().map(|s| s.market_id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m2"]);
        assert!(inner.get_snapshot("m1").await.unwrap().is_none());
    }
}
