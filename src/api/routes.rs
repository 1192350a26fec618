use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::db::SnapshotStore;
use crate::detector;
use crate::error::{AppError, Result};
use crate::types::{now_ms, Anomaly, HistoryPoint, MarketSnapshot, Report};

const DEFAULT_HISTORY_HOURS: u64 = 24;
const MAX_HISTORY_HOURS: u64 = 24 * 365;
const DEFAULT_REPORT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn SnapshotStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/markets", get(get_markets))
        .route("/api/markets/:id/anomalies", get(get_market_anomalies))
        .route("/api/markets/:id/history", get(get_market_history))
        .route("/api/reports", get(get_reports))
        .route("/api/stats/latency", get(get_stats_latency))
        .with_state(state)
}

/// Serve `app` until `signal` resolves or the server stops on its own.
/// Either way `shutdown` is flipped so the scheduler winds down too.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: watch::Sender<bool>, signal: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut api_shutdown = shutdown.subscribe();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    };
    tokio::pin!(server);

    let served = tokio::select! {
        res = &mut server => {
            warn!("HTTP API stopped without a shutdown signal");
            res
        }
        _ = signal => {
            info!("Shutdown signal received");
            let _ = shutdown.send(true);
            server.await
        }
    };
    let _ = shutdown.send(true);
    served?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u64>,
}

#[derive(Deserialize)]
pub struct ReportsQuery {
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub cycles_completed: u64,
    pub last_cycle_at_ms: Option<i64>,
    pub cycle_in_flight: bool,
    pub reports_emitted: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketResponse {
    #[serde(flatten)]
    pub snapshot: MarketSnapshot,
    pub anomalies: Vec<Anomaly>,
    pub has_anomaly: bool,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_cycle_at_ms();
    Json(HealthResponse {
        status: "ok",
        timestamp: now_ms(),
        cycles_completed: state.health.cycles_completed(),
        last_cycle_at_ms: (last > 0).then_some(last),
        cycle_in_flight: state.health.cycle_in_flight(),
        reports_emitted: state.health.reports_emitted(),
    })
}

async fn get_markets(State(state): State<ApiState>) -> Result<Json<Vec<MarketResponse>>> {
    let markets = state
        .store
        .list_snapshots()
        .await?
        .into_iter()
        .map(|snapshot| {
            let anomalies = detector::detect(&snapshot);
            MarketResponse {
                has_anomaly: !anomalies.is_empty(),
                snapshot,
                anomalies,
            }
        })
        .collect();
    Ok(Json(markets))
}

async fn get_market_anomalies(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
) -> Result<Json<Vec<Anomaly>>> {
    let snapshot = state
        .store
        .get_snapshot(&market_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("market {market_id}")))?;
    Ok(Json(detector::detect(&snapshot)))
}

async fn get_market_history(
    State(state): State<ApiState>,
    Path(market_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>> {
    let hours = params
        .hours
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_HISTORY_HOURS)
        .min(MAX_HISTORY_HOURS);
    let history = state
        .store
        .query_history(&market_id, Duration::from_secs(hours * 3600))
        .await?;
    Ok(Json(history))
}

async fn get_reports(
    State(state): State<ApiState>,
    Query(params): Query<ReportsQuery>,
) -> Result<Json<Vec<Report>>> {
    let limit = params.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_REPORT_LIMIT);
    Ok(Json(state.store.list_reports(limit).await?))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1000.0);
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: to_ms(p50),
        p95_ms: to_ms(p95),
        p99_ms: to_ms(p99),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use crate::types::{now_ms, Category};
    use serde_json::Value;

    fn snapshot(id: &str, prev_1h: Option<f64>, volume_24h: f64, volume_average: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: id.to_string(),
            question: format!("Will {id} happen?"),
            category: Category::Politics,
            current_price: 0.80,
            previous_price_1h: prev_1h,
            // Far enough from current that the hour's move is a trend, not volatility.
            previous_price_24h: Some(0.45),
            volume_24h,
            volume_average,
            liquidity: 1_000.0,
            observed_at_ms: now_ms(),
        }
    }

    /// Serve the router on an ephemeral port; returns its base URL.
    async fn spawn_api(store: Arc<MemoryStore>) -> String {
        let state = ApiState {
            store,
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new().unwrap()),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn markets_carry_fresh_anomalies() {
        let store = MemoryStore::new();
        store.upsert_snapshot(&snapshot("hot", Some(0.60), 60_000.0, 5_000.0)).await.unwrap();
        store.upsert_snapshot(&snapshot("quiet", None, 1_000.0, 1_000.0)).await.unwrap();
        let base = spawn_api(store).await;

        let body: Vec<Value> = reqwest::get(format!("{base}/api/markets"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.len(), 2);

        let hot = body.iter().find(|m| m["marketId"] == "hot").unwrap();
        assert_eq!(hot["hasAnomaly"], true);
        assert_eq!(hot["anomalies"].as_array().unwrap().len(), 2);
        assert_eq!(hot["currentPrice"], 0.80);

        let quiet = body.iter().find(|m| m["marketId"] == "quiet").unwrap();
        assert_eq!(quiet["hasAnomaly"], false);
        assert!(quiet["anomalies"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn anomalies_for_unknown_market_is_404() {
        let store = MemoryStore::new();
        store.upsert_snapshot(&snapshot("hot", Some(0.60), 60_000.0, 5_000.0)).await.unwrap();
        let base = spawn_api(store).await;

        let missing = reqwest::get(format!("{base}/api/markets/nope/anomalies")).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let found = reqwest::get(format!("{base}/api/markets/hot/anomalies")).await.unwrap();
        assert!(found.status().is_success());
        let anomalies: Vec<Anomaly> = found.json().await.unwrap();
        assert_eq!(anomalies.len(), 2);
    }

    #[tokio::test]
    async fn huge_history_window_is_clamped() {
        let store = MemoryStore::new();
        store
            .append_history(&HistoryPoint {
                market_id: "m1".to_string(),
                price: 0.5,
                volume: 10.0,
                timestamp_ms: now_ms() - 60_000,
            })
            .await
            .unwrap();
        let base = spawn_api(store).await;

        let resp = reqwest::get(format!("{base}/api/markets/m1/history?hours=6000000000000000"))
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let points: Vec<HistoryPoint> = resp.json().await.unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn serve_returns_and_flags_shutdown_when_signalled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let app = router(ApiState {
            store: MemoryStore::new(),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new().unwrap()),
        });

        tokio::time::timeout(Duration::from_secs(5), serve(listener, app, tx, async {}))
            .await
            .expect("server should stop once signalled")
            .unwrap();
        assert!(*rx.borrow());
    }
}
