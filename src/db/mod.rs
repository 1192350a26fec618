pub mod models;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{HistoryPoint, MarketSnapshot, Report};

pub use sqlite::SqliteStore;

/// Durable storage for snapshots, history and reports.
///
/// Reads observe this process's own writes. `record_observation` applies a
/// snapshot and its history point as one unit: a concurrent reader sees
/// both or neither.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()>;

    async fn append_history(&self, point: &HistoryPoint) -> Result<()>;

    async fn record_observation(&self, snapshot: &MarketSnapshot, point: &HistoryPoint) -> Result<()>;

    async fn get_snapshot(&self, market_id: &str) -> Result<Option<MarketSnapshot>>;

    /// Most recently observed first.
    async fn list_snapshots(&self) -> Result<Vec<MarketSnapshot>>;

    /// Points newer than `now - since`, oldest first.
    async fn query_history(&self, market_id: &str, since: Duration) -> Result<Vec<HistoryPoint>>;

    /// Returns the id assigned to the report.
    async fn insert_report(&self, report: &Report) -> Result<i64>;

    /// Reports for one market with an event time newer than `now - since`.
    async fn list_recent_reports(&self, market_id: &str, since: Duration) -> Result<Vec<Report>>;

    /// Newest event first.
    async fn list_reports(&self, limit: usize) -> Result<Vec<Report>>;

    /// Drops every report, history point and snapshot.
    async fn purge_all(&self) -> Result<()>;
}
