use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use newsdesk::api::{router, serve, ApiState, HealthState, LatencyStats};
use newsdesk::config::{Config, StoreBackend};
use newsdesk::coordinator::{DeskSettings, NewsDesk};
use newsdesk::db::{SnapshotStore, SqliteStore};
use newsdesk::error::Result;
use newsdesk::feed::GammaFeed;
use newsdesk::report::build_generator;
use newsdesk::state::MemoryStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Store ---
    let store: Arc<dyn SnapshotStore> = match cfg.store_backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::connect(&cfg.db_path).await?),
        StoreBackend::Memory => {
            warn!("STORE_BACKEND=memory: snapshots and reports are lost on restart");
            MemoryStore::new()
        }
    };

    // --- Collaborators ---
    let feed = Arc::new(GammaFeed::new(&cfg)?);
    let generator = build_generator(&cfg)?;
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new()?);

    let desk = Arc::new(NewsDesk::new(
        feed,
        Arc::clone(&store),
        generator,
        Arc::clone(&health),
        Arc::clone(&latency),
        DeskSettings::from_config(&cfg),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Report scheduler (first cycle after STARTUP_DELAY_SECS, then every CYCLE_INTERVAL_SECS)
    info!(
        interval_secs = cfg.cycle_interval_secs,
        max_reports = cfg.max_reports,
        provider = %cfg.report_provider,
        "Starting report scheduler: every {}s, first cycle in {}s",
        cfg.cycle_interval_secs,
        cfg.startup_delay_secs,
    );
    let scheduler = tokio::spawn(Arc::clone(&desk).run(
        Duration::from_secs(cfg.startup_delay_secs),
        cfg.cycle_interval(),
        shutdown_rx,
    ));

    // HTTP API server
    let app = router(ApiState { store, health, latency });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    let signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await
            }
        }
    };
    let served = serve(listener, app, shutdown_tx, signal).await;

    if let Err(e) = scheduler.await {
        error!("Scheduler task failed: {e}");
    }
    served?;
    info!("Shutdown complete");
    Ok(())
}
