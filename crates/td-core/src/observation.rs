//! Outage observation held by the sensor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::STATE_UNKNOWN;

/// Label published when the outage query returns no outages
pub const NO_OUTAGE: &str = "No outage";

/// Result of the most recent successful outage poll
///
/// Replaced wholesale on every successful poll, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageObservation {
    /// Name of the first reported outage, or [`NO_OUTAGE`]
    pub label: String,
    pub observed_at: DateTime<Utc>,
    /// Start of the first reported outage, when the remote provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    /// End of the first reported outage, when the remote provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Number of outages returned for the polled window
    #[serde(default)]
    pub outage_count: usize,
}

impl OutageObservation {
    pub fn new(label: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            observed_at,
            starts_at: None,
            ends_at: None,
            outage_count: 0,
        }
    }

    /// Observation for a poll that found nothing scheduled
    pub fn no_outage(observed_at: DateTime<Utc>) -> Self {
        Self::new(NO_OUTAGE, observed_at)
    }

    /// Placeholder before the first successful poll
    pub fn unknown(since: DateTime<Utc>) -> Self {
        Self::new(STATE_UNKNOWN, since)
    }

    pub fn is_unknown(&self) -> bool {
        self.label == STATE_UNKNOWN
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn with_count(mut self, outage_count: usize) -> Self {
        self.outage_count = outage_count;
        self
    }

    pub fn is_outage(&self) -> bool {
        self.outage_count > 0
    }
}
