//! Engine server binary

use engine::{spawn_engine, Config, SystemClock, ROUTES};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("ENGINE_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Starting fee governance engine"
    );

    let handle = spawn_engine(config, Arc::new(SystemClock))?;

    for route in ROUTES {
        tracing::debug!(method = ?route.method, path = route.path, "{}", route.description);
    }

    // Transport adapters attach to the handle; until then just keep running
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down engine");
    handle.shutdown().await?;
    Ok(())
}
