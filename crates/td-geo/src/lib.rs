//! Geo lookup client
//!
//! Substring lookups for the four address stages (cities, streets, house
//! numbers, flat numbers) and the date-ranged outage query against the
//! Tauron Dystrybucja `waapi` service.
//!
//! # Key Types
//!
//! - [`GeoLookup`] - The lookup capability used by the flow and the sensor
//! - [`TauronClient`] - reqwest-backed implementation
//! - [`StaticLookup`] - in-memory implementation with call counters
//!
//! Lookups never panic and never escalate: transport failures, non-2xx
//! statuses and malformed payloads all come back as [`LookupError`], which
//! callers treat as an empty result plus a failure report.

mod client;
mod error;
mod fake;
mod query;

use async_trait::async_trait;
use td_core::Candidate;

pub use client::{ClientConfig, Endpoints, TauronClient, DEFAULT_BASE_URL};
pub use error::{LookupError, LookupResult};
pub use fake::StaticLookup;
pub use query::{LookupQuery, Outage, OutageQuery, DEFAULT_MIN_QUERY_LENGTH};

/// Lookup capability shared by the address flow and the outage sensor
#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Substring search for one address stage
    ///
    /// Returns `Ok(vec![])` without any network traffic when the partial
    /// name is too short for the stage.
    async fn query(&self, query: &LookupQuery) -> LookupResult<Vec<Candidate>>;

    /// Outages scheduled for a resolved address within a date window
    async fn outages(&self, query: &OutageQuery) -> LookupResult<Vec<Outage>>;
}
