//! Config Entry types
//!
//! A ConfigEntry represents a single configured address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use td_core::{AddressRecord, DOMAIN};

/// Options key holding the poll interval in minutes
pub const OPTION_POLL_INTERVAL: &str = "poll_interval";

/// Source of the config entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Created by completing an address flow
    #[default]
    User,
    /// Created directly from stored data (e.g. restored from a backup)
    Import,
}

/// A configuration entry for one address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    /// Immutable configuration data (the address record)
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    /// Major schema version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Composite address key for duplicate prevention
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    /// Origin type
    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Disable background polling
    #[serde(default)]
    pub pref_disable_polling: bool,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl ConfigEntry {
    /// Create a new config entry
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            version: 1,
            unique_id: None,
            source: ConfigEntrySource::User,
            pref_disable_polling: false,
            created_at: now,
            modified_at: now,
        }
    }

    /// Entry for a resolved address, keyed by its composite unique id
    pub fn for_address(record: &AddressRecord) -> Self {
        Self::new(DOMAIN, record.title())
            .with_data(record.to_data())
            .with_unique_id(record.unique_id())
    }

    /// Set entry data
    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    /// Set entry options
    pub fn with_options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    /// Set unique_id
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// Set source
    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    /// Set the poll interval option (minutes)
    pub fn with_poll_interval(mut self, minutes: u32) -> Self {
        self.options
            .insert(OPTION_POLL_INTERVAL.to_string(), serde_json::json!(minutes));
        self
    }

    /// The address stored in this entry, if the data is well-formed
    pub fn address(&self) -> Option<AddressRecord> {
        AddressRecord::from_data(&self.data)
    }

    /// Configured poll interval in minutes; zero or malformed values are ignored
    pub fn poll_interval(&self) -> Option<u32> {
        self.options
            .get(OPTION_POLL_INTERVAL)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    }
}

/// Update data for a config entry
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub options: Option<HashMap<String, serde_json::Value>>,
    pub pref_disable_polling: Option<bool>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn pref_disable_polling(mut self, disabled: bool) -> Self {
        self.pref_disable_polling = Some(disabled);
        self
    }
}
