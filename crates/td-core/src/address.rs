//! Address resolution state and the persisted address record
//!
//! ```text
//! City → Street → HouseNumber → FlatNumber (optional)
//! ```
//!
//! Each stage depends on the identifiers confirmed by the stages before it,
//! so the accumulator refuses to record a stage whose predecessor is unset
//! and forgets every later stage whenever an earlier one is re-selected.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Candidate;

/// One of the four address stages, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    City,
    Street,
    HouseNumber,
    FlatNumber,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::City,
        Stage::Street,
        Stage::HouseNumber,
        Stage::FlatNumber,
    ];

    /// Form field / data key used for this stage
    pub fn key(self) -> &'static str {
        match self {
            Stage::City => "city",
            Stage::Street => "street",
            Stage::HouseNumber => "house_number",
            Stage::FlatNumber => "flat_number",
        }
    }

    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::City => None,
            Stage::Street => Some(Stage::City),
            Stage::HouseNumber => Some(Stage::Street),
            Stage::FlatNumber => Some(Stage::HouseNumber),
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::City => Some(Stage::Street),
            Stage::Street => Some(Stage::HouseNumber),
            Stage::HouseNumber => Some(Stage::FlatNumber),
            Stage::FlatNumber => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A stage was recorded or read before the stage it depends on
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("address is missing the {missing} stage")]
pub struct IncompleteAddress {
    pub missing: Stage,
}

/// Mutable accumulator for an in-progress address resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionState {
    selected: [Option<Candidate>; 4],
}

impl ResolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the selection for `stage`, dropping every later stage
    pub fn set(&mut self, stage: Stage, candidate: Candidate) -> Result<(), IncompleteAddress> {
        if let Some(previous) = stage.previous() {
            if self.get(previous).is_none() {
                return Err(IncompleteAddress { missing: previous });
            }
        }
        self.selected[stage.index()] = Some(candidate);
        for later in &mut self.selected[stage.index() + 1..] {
            *later = None;
        }
        Ok(())
    }

    /// Record that the address has no flat number
    pub fn skip_flat_number(&mut self) -> Result<(), IncompleteAddress> {
        self.set(Stage::FlatNumber, Candidate::new("", ""))
    }

    pub fn get(&self, stage: Stage) -> Option<&Candidate> {
        self.selected[stage.index()].as_ref()
    }

    pub fn city_id(&self) -> Option<&str> {
        self.get(Stage::City).map(|c| c.identifier.as_str())
    }

    pub fn city_name(&self) -> Option<&str> {
        self.get(Stage::City).map(|c| c.display_name.as_str())
    }

    pub fn street_id(&self) -> Option<&str> {
        self.get(Stage::Street).map(|c| c.identifier.as_str())
    }

    pub fn street_name(&self) -> Option<&str> {
        self.get(Stage::Street).map(|c| c.display_name.as_str())
    }

    pub fn house_number(&self) -> Option<&str> {
        self.get(Stage::HouseNumber).map(|c| c.identifier.as_str())
    }

    pub fn flat_number(&self) -> Option<&str> {
        self.get(Stage::FlatNumber).map(|c| c.identifier.as_str())
    }

    /// Build the persisted record once every stage has been recorded
    pub fn to_record(&self) -> Result<AddressRecord, IncompleteAddress> {
        let require = |stage: Stage| {
            self.get(stage)
                .cloned()
                .ok_or(IncompleteAddress { missing: stage })
        };
        let city = require(Stage::City)?;
        let street = require(Stage::Street)?;
        let house = require(Stage::HouseNumber)?;
        let flat = require(Stage::FlatNumber)?;

        Ok(AddressRecord {
            city_id: city.identifier,
            city_name: city.display_name,
            street_id: street.identifier,
            street_name: street.display_name,
            house_number: house.identifier,
            flat_number: flat.identifier,
        })
    }
}

/// Fully resolved address, persisted as config entry data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRecord {
    pub city_id: String,
    pub city_name: String,
    pub street_id: String,
    pub street_name: String,
    pub house_number: String,
    /// Empty when the address has no flat number
    #[serde(default)]
    pub flat_number: String,
}

impl AddressRecord {
    /// Composite key preventing the same address from being configured twice
    pub fn unique_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.city_id, self.street_id, self.house_number, self.flat_number
        )
    }

    /// Human-readable title, e.g. "Kraków, Floriańska 12/3"
    pub fn title(&self) -> String {
        let mut title = format!("{}, {} {}", self.city_name, self.street_name, self.house_number);
        if self.has_flat_number() {
            title.push('/');
            title.push_str(&self.flat_number);
        }
        title
    }

    pub fn has_flat_number(&self) -> bool {
        !self.flat_number.is_empty()
    }

    /// Convert to config entry data
    pub fn to_data(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Read back from config entry data
    pub fn from_data(data: &HashMap<String, serde_json::Value>) -> Option<Self> {
        let map: serde_json::Map<String, serde_json::Value> =
            data.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        serde_json::from_value(serde_json::Value::Object(map)).ok()
    }
}
