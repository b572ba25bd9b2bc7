//! Sensor lifecycle per config entry
//!
//! Setting up an entry builds its sensor, publishes the placeholder state
//! and starts the poller. Unloading stops the poller and withdraws the
//! state.

use std::sync::Arc;

use dashmap::DashMap;
use td_config_entries::ConfigEntry;
use td_core::{Clock, EntityId};
use td_geo::GeoLookup;
use td_state_store::StateStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{SensorError, SensorResult};
use crate::poller::spawn_poller;
use crate::sensor::{OutageSensor, DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW_DAYS};

/// Defaults applied to entries that do not carry their own values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    pub poll_interval: u32,
    pub window_days: u32,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

struct RunningSensor {
    sensor: Arc<OutageSensor>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

/// Sensors keyed by config entry id
pub struct SensorRegistry {
    lookup: Arc<dyn GeoLookup>,
    clock: Arc<dyn Clock>,
    store: Arc<StateStore>,
    settings: SensorSettings,
    sensors: DashMap<String, RunningSensor>,
}

impl SensorRegistry {
    pub fn new(
        lookup: Arc<dyn GeoLookup>,
        clock: Arc<dyn Clock>,
        store: Arc<StateStore>,
        settings: SensorSettings,
    ) -> Self {
        Self {
            lookup,
            clock,
            store,
            settings,
            sensors: DashMap::new(),
        }
    }

    /// Build and start the sensor for an entry, replacing any running one
    ///
    /// Entries with `pref_disable_polling` get a sensor and a published
    /// state but no background task.
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> SensorResult<Arc<OutageSensor>> {
        let address = entry
            .address()
            .ok_or_else(|| SensorError::InvalidEntry(entry.entry_id.clone()))?;
        let poll_interval = entry.poll_interval().unwrap_or(self.settings.poll_interval);

        let sensor = Arc::new(
            OutageSensor::new(address, self.lookup.clone(), self.clock.clone())?
                .with_poll_interval(poll_interval)?
                .with_window_days(self.settings.window_days),
        );

        if self.sensors.contains_key(&entry.entry_id) {
            self.unload_entry(&entry.entry_id).await;
        }

        self.store.publish(sensor.state().await);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = if entry.pref_disable_polling {
            info!(entity_id = %sensor.entity_id(), "Polling disabled for entry");
            None
        } else {
            Some(spawn_poller(sensor.clone(), self.store.clone(), shutdown_rx))
        };

        self.sensors.insert(
            entry.entry_id.clone(),
            RunningSensor {
                sensor: sensor.clone(),
                shutdown,
                handle,
            },
        );
        info!(entity_id = %sensor.entity_id(), poll_interval, "Set up outage sensor");
        Ok(sensor)
    }

    /// Stop the entry's poller and remove its state; false if not set up
    #[instrument(skip(self))]
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some((_, running)) = self.sensors.remove(entry_id) else {
            return false;
        };

        stop(running.shutdown, running.handle).await;
        self.store.remove(running.sensor.entity_id());
        info!(entity_id = %running.sensor.entity_id(), "Unloaded outage sensor");
        true
    }

    pub fn get(&self, entry_id: &str) -> Option<Arc<OutageSensor>> {
        self.sensors.get(entry_id).map(|r| r.sensor.clone())
    }

    /// Refresh one entry's sensor now and publish the result
    pub async fn refresh_entry(&self, entry_id: &str) -> Option<td_core::State> {
        let sensor = self.get(entry_id)?;
        let observation = sensor.refresh().await;
        Some(self.store.publish(sensor.render(&observation)))
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .sensors
            .iter()
            .map(|r| r.sensor.entity_id().clone())
            .collect();
        ids.sort_by_key(|id| id.to_string());
        ids
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Stop every poller; published states are left in place
    pub async fn shutdown_all(&self) {
        let entry_ids: Vec<String> = self.sensors.iter().map(|r| r.key().clone()).collect();
        for entry_id in entry_ids {
            if let Some((_, running)) = self.sensors.remove(&entry_id) {
                stop(running.shutdown, running.handle).await;
            }
        }
    }
}

async fn stop(shutdown: watch::Sender<bool>, handle: Option<JoinHandle<()>>) {
    let _ = shutdown.send(true);
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            warn!("Outage poller ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use td_core::{AddressRecord, MockClock, STATE_UNKNOWN};
    use td_geo::{Outage, StaticLookup};

    fn address(flat: &str) -> AddressRecord {
        AddressRecord {
            city_id: "1".into(),
            city_name: "Kraków".into(),
            street_id: "77".into(),
            street_name: "Floriańska".into(),
            house_number: "12".into(),
            flat_number: flat.into(),
        }
    }

    fn registry(lookup: Arc<StaticLookup>) -> (SensorRegistry, Arc<StateStore>) {
        let store = Arc::new(StateStore::new());
        let registry = SensorRegistry::new(
            lookup,
            Arc::new(MockClock::new()),
            store.clone(),
            SensorSettings::default(),
        );
        (registry, store)
    }

    async fn wait_for_state(store: &StateStore, entity_id: &str, expected: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.get_state(entity_id).as_deref() != Some(expected) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("state never published");
    }

    #[tokio::test]
    async fn test_setup_publishes_and_polls() {
        let lookup = Arc::new(
            StaticLookup::new().with_outages(vec![Outage::new("Planned maintenance")]),
        );
        let (registry, store) = registry(lookup.clone());
        let entry = ConfigEntry::for_address(&address("")).with_poll_interval(15);

        let sensor = registry.setup_entry(&entry).await.unwrap();
        assert_eq!(sensor.poll_interval(), 15);
        assert_eq!(registry.len(), 1);

        let entity_id = sensor.entity_id().to_string();
        wait_for_state(&store, &entity_id, "Planned maintenance").await;
        assert_eq!(lookup.outage_calls(), 1);

        registry.shutdown_all().await;
        assert!(registry.is_empty());
        // states survive a shutdown
        assert!(store.get(&entity_id).is_some());
    }

    #[tokio::test]
    async fn test_entry_without_interval_uses_default() {
        let (registry, _) = registry(Arc::new(StaticLookup::new()));
        let entry = ConfigEntry::for_address(&address(""));

        let sensor = registry.setup_entry(&entry).await.unwrap();
        assert_eq!(sensor.poll_interval(), DEFAULT_POLL_INTERVAL);
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_polling_disabled() {
        let lookup = Arc::new(StaticLookup::new());
        let (registry, store) = registry(lookup.clone());
        let mut entry = ConfigEntry::for_address(&address("3"));
        entry.pref_disable_polling = true;

        let sensor = registry.setup_entry(&entry).await.unwrap();
        let entity_id = sensor.entity_id().to_string();
        assert_eq!(store.get_state(&entity_id).as_deref(), Some(STATE_UNKNOWN));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lookup.outage_calls(), 0);

        // an explicit refresh still works
        let state = registry.refresh_entry(&entry.entry_id).await.unwrap();
        assert_eq!(state.state, td_core::NO_OUTAGE);
        assert_eq!(lookup.outage_calls(), 1);
    }

    #[tokio::test]
    async fn test_unload_removes_state() {
        let (registry, store) = registry(Arc::new(StaticLookup::new()));
        let entry = ConfigEntry::for_address(&address(""));

        let sensor = registry.setup_entry(&entry).await.unwrap();
        let entity_id = sensor.entity_id().to_string();
        assert!(store.get(&entity_id).is_some());

        assert!(registry.unload_entry(&entry.entry_id).await);
        assert!(store.get(&entity_id).is_none());
        assert!(registry.get(&entry.entry_id).is_none());
        assert!(!registry.unload_entry(&entry.entry_id).await);
    }

    #[tokio::test]
    async fn test_same_named_addresses_keep_separate_states() {
        let (registry, store) = registry(Arc::new(StaticLookup::new()));
        let nowa_wies = |city_id: &str| AddressRecord {
            city_id: city_id.into(),
            city_name: "Nowa Wieś".into(),
            street_id: "5".into(),
            street_name: "Polna".into(),
            house_number: "1".into(),
            flat_number: "".into(),
        };
        let first = ConfigEntry::for_address(&nowa_wies("10"));
        let second = ConfigEntry::for_address(&nowa_wies("11"));

        let a = registry.setup_entry(&first).await.unwrap();
        let b = registry.setup_entry(&second).await.unwrap();
        assert_ne!(a.entity_id(), b.entity_id());
        assert_eq!(store.entity_ids("sensor").len(), 2);

        assert!(registry.unload_entry(&first.entry_id).await);
        assert!(store.get(&a.entity_id().to_string()).is_none());
        assert!(store.get(&b.entity_id().to_string()).is_some());
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_setup_replaces_running_sensor() {
        let (registry, _) = registry(Arc::new(StaticLookup::new()));
        let entry = ConfigEntry::for_address(&address(""));

        registry.setup_entry(&entry).await.unwrap();
        let reloaded = entry.clone().with_poll_interval(5);
        let sensor = registry.setup_entry(&reloaded).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(sensor.poll_interval(), 5);
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_entry_without_address_rejected() {
        let (registry, _) = registry(Arc::new(StaticLookup::new()));
        let entry = ConfigEntry::new(td_core::DOMAIN, "broken");

        let result = registry.setup_entry(&entry).await;
        assert!(matches!(result, Err(SensorError::InvalidEntry(_))));
        assert!(registry.is_empty());
    }
}
