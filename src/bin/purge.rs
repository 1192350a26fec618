//! Deletes every report, history point and snapshot from the configured store.

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use newsdesk::config::{Config, StoreBackend};
use newsdesk::db::{SnapshotStore, SqliteStore};
use newsdesk::error::Result;

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

    if let Err(e) = run(&cfg).await {
        error!("Purge failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: &Config) -> Result<()> {
    if cfg.store_backend == StoreBackend::Memory {
        info!("STORE_BACKEND=memory holds nothing between runs; nothing to purge");
        return Ok(());
    }

    let store = SqliteStore::connect(&cfg.db_path).await?;
    store.purge_all().await?;
    info!(db_path = %cfg.db_path, "Cleared all reports, history and market snapshots");
    Ok(())
}
