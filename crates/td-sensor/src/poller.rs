//! Background polling
//!
//! One task per sensor ticks at the sensor's poll interval, refreshes it
//! and publishes the result. The first tick fires immediately so a new
//! sensor gets a state right away.

use std::sync::Arc;

use td_state_store::StateStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::sensor::OutageSensor;

/// Spawn the polling task; it exits when `shutdown` flips to `true` or its
/// sender is dropped
pub fn spawn_poller(
    sensor: Arc<OutageSensor>,
    store: Arc<StateStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sensor.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            entity_id = %sensor.entity_id(),
            poll_interval = sensor.poll_interval(),
            "Outage poller started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let observation = sensor.refresh().await;
                    store.publish(sensor.render(&observation));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    debug!(entity_id = %sensor.entity_id(), "Ignoring shutdown signal reset");
                }
            }
        }

        info!(entity_id = %sensor.entity_id(), "Outage poller stopped");
    })
}
