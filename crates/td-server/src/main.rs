//! Tauron outage service
//!
//! Usage: `tauron-outage [CONFIG_DIR]` (or `TD_CONFIG_DIR`, default `./config`)

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use td_config::ServiceConfig;
use td_core::SystemClock;
use td_geo::TauronClient;
use td_server::{client_config, TauronOutage};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TD_CONFIG_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!("Starting Tauron outage service from {:?}", config_dir);

    let config = ServiceConfig::load(&config_dir).context("Failed to load configuration")?;
    let lookup = TauronClient::new(client_config(&config.integration))
        .context("Failed to build lookup client")?;

    let service = TauronOutage::new(
        &config_dir,
        config,
        Arc::new(lookup),
        Arc::new(SystemClock),
    )
    .await?;
    service.setup_entries().await;

    let addr = service.listen_addr();
    td_api::start_server(service.app_state(), &addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .with_context(|| format!("API server on {} failed", addr))?;

    info!("Shutting down...");
    service.shutdown().await;
    Ok(())
}
