//! State type representing an entity's published state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, MAX_STATE_LENGTH, STATE_UNKNOWN};

/// Represents the state of an entity at a point in time
///
/// State includes the entity's current value (as a string), any associated
/// attributes, and timestamps for when the state was last changed and updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,

    /// The state value (e.g., "No outage", "Planned maintenance", "unknown")
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state was last changed (different from previous state)
    pub last_changed: DateTime<Utc>,

    /// When the state was last updated (even if value didn't change)
    pub last_updated: DateTime<Utc>,
}

impl State {
    /// Create a new state stamped at `now`
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id,
            state: clamp_state(state.into()),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    /// Create an updated state, preserving last_changed if state value is the same
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let new_state = clamp_state(new_state.into());
        let state_changed = self.state != new_state;

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed: if state_changed {
                now
            } else {
                self.last_changed
            },
            last_updated: now,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Get an attribute value by key
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

fn clamp_state(state: String) -> String {
    if state.chars().count() <= MAX_STATE_LENGTH {
        state
    } else {
        state.chars().take(MAX_STATE_LENGTH).collect()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps are not compared
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
