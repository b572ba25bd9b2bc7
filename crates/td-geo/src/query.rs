//! Query parameters for the lookup endpoints

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use td_core::{AddressRecord, IncompleteAddress, ResolutionState, Stage};

/// Shortest partial city or street name that is sent to the service
pub const DEFAULT_MIN_QUERY_LENGTH: usize = 3;

/// Substring search for one address stage, scoped by the parent identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub stage: Stage,
    pub part_name: String,
    pub city_id: Option<String>,
    pub street_id: Option<String>,
    pub house_number: Option<String>,
}

impl LookupQuery {
    pub fn cities(part_name: impl Into<String>) -> Self {
        Self {
            stage: Stage::City,
            part_name: part_name.into(),
            city_id: None,
            street_id: None,
            house_number: None,
        }
    }

    pub fn streets(city_id: impl Into<String>, part_name: impl Into<String>) -> Self {
        Self {
            stage: Stage::Street,
            city_id: Some(city_id.into()),
            ..Self::cities(part_name)
        }
    }

    pub fn house_numbers(
        city_id: impl Into<String>,
        street_id: impl Into<String>,
        part_name: impl Into<String>,
    ) -> Self {
        Self {
            stage: Stage::HouseNumber,
            street_id: Some(street_id.into()),
            ..Self::streets(city_id, part_name)
        }
    }

    pub fn flat_numbers(
        city_id: impl Into<String>,
        street_id: impl Into<String>,
        house_number: impl Into<String>,
        part_name: impl Into<String>,
    ) -> Self {
        Self {
            stage: Stage::FlatNumber,
            house_number: Some(house_number.into()),
            ..Self::house_numbers(city_id, street_id, part_name)
        }
    }

    /// Build the query for `stage` from the identifiers confirmed so far
    pub fn for_stage(
        stage: Stage,
        state: &ResolutionState,
        part_name: impl Into<String>,
    ) -> Result<Self, IncompleteAddress> {
        let parent = |stage: Stage| {
            state
                .get(stage)
                .map(|c| c.identifier.clone())
                .ok_or(IncompleteAddress { missing: stage })
        };

        Ok(match stage {
            Stage::City => Self::cities(part_name),
            Stage::Street => Self::streets(parent(Stage::City)?, part_name),
            Stage::HouseNumber => {
                Self::house_numbers(parent(Stage::City)?, parent(Stage::Street)?, part_name)
            }
            Stage::FlatNumber => Self::flat_numbers(
                parent(Stage::City)?,
                parent(Stage::Street)?,
                parent(Stage::HouseNumber)?,
                part_name,
            ),
        })
    }

    /// Minimum trimmed length of the partial name for this stage
    ///
    /// City and street names are free-text substrings and need
    /// `min_name_length` characters; house and flat numbers are short
    /// identifiers and only need to be non-empty.
    pub fn required_length(stage: Stage, min_name_length: usize) -> usize {
        match stage {
            Stage::City | Stage::Street => min_name_length,
            Stage::HouseNumber | Stage::FlatNumber => 1,
        }
    }

    /// Whether the partial name is long enough to be worth a network call
    pub fn is_searchable(&self, min_name_length: usize) -> bool {
        self.part_name.trim().chars().count()
            >= Self::required_length(self.stage, min_name_length)
    }
}

/// Outage query for a resolved address over a date window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutageQuery {
    pub city_id: String,
    pub street_id: String,
    pub house_number: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl OutageQuery {
    /// Query the window `[from, from + days]`
    pub fn for_address(record: &AddressRecord, from: DateTime<Utc>, days: i64) -> Self {
        Self {
            city_id: record.city_id.clone(),
            street_id: record.street_id.clone(),
            house_number: record.house_number.clone(),
            from,
            to: from + Duration::days(days),
        }
    }
}

/// One outage reported for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

impl Outage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            starts_at: None,
            ends_at: None,
        }
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
}
