//! Published entity states
//!
//! The StateStore holds the latest state of every sensor so the API can
//! serve it without touching the sensors. Entities are indexed by domain.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use td_core::{EntityId, State};
use tracing::{debug, instrument, trace};

/// Latest published state per entity
#[derive(Default)]
pub struct StateStore {
    /// Entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Entity ids by domain
    domain_index: DashMap<String, Vec<String>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the state value differs from the
    /// stored one; `last_updated` always moves to `now`.
    #[instrument(skip(self, state, attributes, now), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.get(&key);

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, now),
            None => State::new(entity_id.clone(), state, attributes, now),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key);
        }

        new_state
    }

    /// Store a state rendered elsewhere, merging timestamps with the
    /// previously stored one
    pub fn publish(&self, state: State) -> State {
        self.set(
            state.entity_id,
            state.state,
            state.attributes,
            state.last_updated,
        )
    }

    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Entity ids for a domain, in publication order
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// All states sorted by entity id
    pub fn all(&self) -> Vec<State> {
        let mut states: Vec<State> = self.states.iter().map(|r| r.value().clone()).collect();
        states.sort_by_key(|s| s.entity_id.to_string());
        states
    }

    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if old_state.is_some() {
            trace!("Removing entity state");
            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }
        }

        old_state
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

pub type SharedStateStore = Arc<StateStore>;
