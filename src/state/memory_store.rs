use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::db::SnapshotStore;
use crate::error::Result;
use crate::types::{cutoff_ms, HistoryPoint, MarketSnapshot, Report};

// ---------------------------------------------------------------------------
// MarketEntry
// ---------------------------------------------------------------------------

/// Snapshot and history for one market live behind the same map shard lock,
/// so an observation lands as one unit.
#[derive(Debug, Default)]
struct MarketEntry {
    snapshot: Option<MarketSnapshot>,
    /// Append order. Timestamps are normally monotonic but reads sort anyway.
    history: Vec<HistoryPoint>,
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local `SnapshotStore`. Nothing survives a restart.
pub struct MemoryStore {
    /// market_id → snapshot + history
    markets: DashMap<String, MarketEntry>,
    /// market_id → reports in insertion order
    reports: DashMap<String, Vec<Report>>,
    next_report_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn market_count(&self) -> usize {
        self.markets.iter().filter(|e| e.value().snapshot.is_some()).count()
    }

    pub fn report_count(&self) -> usize {
        self.reports.iter().map(|e| e.value().len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            markets: DashMap::new(),
            reports: DashMap::new(),
            next_report_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let mut entry = self.markets.entry(snapshot.market_id.clone()).or_default();
        entry.snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn append_history(&self, point: &HistoryPoint) -> Result<()> {
        let mut entry = self.markets.entry(point.market_id.clone()).or_default();
        entry.history.push(point.clone());
        Ok(())
    }

    async fn record_observation(&self, snapshot: &MarketSnapshot, point: &HistoryPoint) -> Result<()> {
        let mut entry = self.markets.entry(snapshot.market_id.clone()).or_default();
        entry.snapshot = Some(snapshot.clone());
        entry.history.push(point.clone());
        Ok(())
    }

    async fn get_snapshot(&self, market_id: &str) -> Result<Option<MarketSnapshot>> {
        Ok(self.markets.get(market_id).and_then(|e| e.snapshot.clone()))
    }

    async fn list_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
        let mut snapshots: Vec<MarketSnapshot> = self
            .markets
            .iter()
            .filter_map(|e| e.value().snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| {
            b.observed_at_ms
                .cmp(&a.observed_at_ms)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        Ok(snapshots)
    }

    async fn query_history(&self, market_id: &str, since: Duration) -> Result<Vec<HistoryPoint>> {
        let cutoff = cutoff_ms(since);
        let Some(entry) = self.markets.get(market_id) else {
            return Ok(Vec::new());
        };
        let mut points: Vec<HistoryPoint> = entry
            .history
            .iter()
            .filter(|p| p.timestamp_ms > cutoff)
            .cloned()
            .collect();
        drop(entry);
        points.sort_by_key(|p| p.timestamp_ms);
        Ok(points)
    }

    async fn insert_report(&self, report: &Report) -> Result<i64> {
        let id = self.next_report_id.fetch_add(1, Ordering::Relaxed);
        let mut stored = report.clone();
        stored.id = Some(id);
        self.reports.entry(report.market_id.clone()).or_default().push(stored);
        Ok(id)
    }

    async fn list_recent_reports(&self, market_id: &str, since: Duration) -> Result<Vec<Report>> {
        let cutoff = cutoff_ms(since);
        let mut recent: Vec<Report> = self
            .reports
            .get(market_id)
            .map(|list| list.iter().filter(|r| r.event_at_ms > cutoff).cloned().collect())
            .unwrap_or_default();
        recent.sort_by(|a, b| b.event_at_ms.cmp(&a.event_at_ms));
        Ok(recent)
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<Report>> {
        let mut all: Vec<Report> = self
            .reports
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        all.sort_by(|a, b| {
            b.event_at_ms
                .cmp(&a.event_at_ms)
                .then_with(|| b.id.cmp(&a.id))
        });
        all.truncate(limit);
        Ok(all)
    }

    async fn purge_all(&self) -> Result<()> {
        self.reports.clear();
        self.markets.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
