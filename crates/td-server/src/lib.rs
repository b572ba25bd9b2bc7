//! Service wiring
//!
//! Builds the shared components from a [`ServiceConfig`] and a lookup
//! implementation: config entries, flow manager, sensors and the state
//! store the API reads from.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use td_api::AppState;
use td_config::{IntegrationConfig, ServiceConfig};
use td_config_entries::{ConfigEntries, Storage};
use td_core::{Clock, DOMAIN};
use td_flow::{FlowManager, FlowOptions};
use td_geo::{ClientConfig, Endpoints, GeoLookup};
use td_sensor::{SensorRegistry, SensorSettings};
use td_state_store::StateStore;
use tracing::{info, warn};

/// Lookup client settings from the integration section
pub fn client_config(config: &IntegrationConfig) -> ClientConfig {
    let defaults = Endpoints::default();
    let overrides = &config.endpoints;

    ClientConfig {
        base_url: config.base_url.clone(),
        endpoints: Endpoints {
            cities: overrides.cities.clone().unwrap_or(defaults.cities),
            streets: overrides.streets.clone().unwrap_or(defaults.streets),
            house_numbers: overrides
                .house_numbers
                .clone()
                .unwrap_or(defaults.house_numbers),
            flat_numbers: overrides
                .flat_numbers
                .clone()
                .unwrap_or(defaults.flat_numbers),
            outages: overrides.outages.clone().unwrap_or(defaults.outages),
        },
        timeout: Duration::from_secs(config.request_timeout),
        min_query_length: config.min_query_length,
    }
}

pub fn flow_options(config: &IntegrationConfig) -> FlowOptions {
    FlowOptions {
        min_query_length: config.min_query_length,
        dedup_display_names: config.dedup_display_names,
        auto_select_single_match: config.auto_select_single_match,
        default_poll_interval: config.poll_interval,
    }
}

/// The running outage service
pub struct TauronOutage {
    pub config: ServiceConfig,
    pub config_entries: Arc<ConfigEntries>,
    pub states: Arc<StateStore>,
    pub sensors: Arc<SensorRegistry>,
    pub flows: Arc<FlowManager>,
}

impl TauronOutage {
    /// Wire up the components and load stored config entries
    pub async fn new(
        config_dir: impl AsRef<Path>,
        config: ServiceConfig,
        lookup: Arc<dyn GeoLookup>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::new(config_dir.as_ref()));
        let config_entries = Arc::new(ConfigEntries::new(storage));
        config_entries
            .load()
            .await
            .context("Failed to load config entries")?;

        let states = Arc::new(StateStore::new());
        let sensors = Arc::new(SensorRegistry::new(
            lookup.clone(),
            clock,
            states.clone(),
            SensorSettings {
                poll_interval: config.integration.poll_interval,
                window_days: config.integration.outage_window_days,
            },
        ));
        let flows = Arc::new(FlowManager::new(
            lookup,
            config_entries.clone(),
            flow_options(&config.integration),
        ));

        Ok(Self {
            config,
            config_entries,
            states,
            sensors,
            flows,
        })
    }

    /// Start a sensor for every stored entry; returns how many started
    ///
    /// A broken entry is logged and skipped.
    pub async fn setup_entries(&self) -> usize {
        let mut started = 0;
        for entry in self.config_entries.get_by_domain(DOMAIN) {
            match self.sensors.setup_entry(&entry).await {
                Ok(_) => started += 1,
                Err(e) => warn!("Skipping config entry {}: {}", entry.entry_id, e),
            }
        }
        info!("Set up {} outage sensor(s)", started);
        started
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            flows: self.flows.clone(),
            config_entries: self.config_entries.clone(),
            states: self.states.clone(),
            sensors: self.sensors.clone(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!(
            "{}:{}",
            self.config.http.server_host, self.config.http.server_port
        )
    }

    /// Stop all pollers
    pub async fn shutdown(&self) {
        self.sensors.shutdown_all().await;
    }
}
