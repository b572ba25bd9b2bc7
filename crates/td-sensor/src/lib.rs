//! Outage sensor
//!
//! One sensor per configured address. Its state is the name of the first
//! outage scheduled within the query window, or `No outage`.
//!
//! # Key Types
//!
//! - [`OutageSensor`] - Interval-cached outage polling for one address
//! - [`SensorRegistry`] - Sets up and unloads sensors per config entry
//! - [`spawn_poller`] - Background task publishing refreshed states

mod error;
mod poller;
mod registry;
mod sensor;

pub use error::{SensorError, SensorResult};
pub use poller::spawn_poller;
pub use registry::{SensorRegistry, SensorSettings};
pub use sensor::{OutageSensor, DEFAULT_POLL_INTERVAL, DEFAULT_WINDOW_DAYS};
