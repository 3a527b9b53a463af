//! Coordinator host binary
//!
//! Loads `configuration.yaml` from the config directory (first argument,
//! then `HA_CONFIG_DIR`, then `./config`), sets up every integration entry
//! and runs until Ctrl-C.

mod host;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ha_config::load_config;
use ha_state_store::StateStore;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::host::Host;

fn config_dir() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("HA_CONFIG_DIR"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let dir = config_dir();
    let config = load_config(&dir)
        .with_context(|| format!("failed to load configuration from {}", dir.display()))?;

    // RUST_LOG wins over the logger: section
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logger.filter_directives()))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(config_dir = %dir.display(), "Starting coordinator host");

    let states = Arc::new(StateStore::new());
    let mut changes = states.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => debug!(
                    entity_id = %change.entity_id,
                    old = change.old_state.as_ref().map(|s| s.state.as_str()),
                    new = change.new_state.as_ref().map(|s| s.state.as_str()),
                    "State changed"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "State change log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut host = Host::new(states);
    host.setup_integrations(&config.integrations).await;
    info!(entities = host.states().entity_count(), "Coordinator host is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    host.shutdown().await;
    watcher.abort();
    Ok(())
}
