//! Configured addresses
//!
//! Entries are kept in memory keyed by entry id, with a second index on
//! `(domain, unique_id)` that refuses the same address twice. Every
//! mutation is written through to `.storage/core.config_entries`.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::storage::{Storable, Storage, StorageError, StorageResult};

pub const STORAGE_KEY: &str = "core.config_entries";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("no config entry {0}")]
    NotFound(String),

    #[error("address {unique_id} is already configured for {domain}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Persisted form of all entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

type AddressKey = (String, String);

fn address_key(entry: &ConfigEntry) -> Option<AddressKey> {
    entry
        .unique_id
        .as_ref()
        .map(|unique_id| (entry.domain.clone(), unique_id.clone()))
}

/// All configured addresses
pub struct ConfigEntries {
    storage: Arc<Storage>,
    entries: DashMap<String, ConfigEntry>,
    by_address: DashMap<AddressKey, String>,
    /// Held across check, insert and save
    write_lock: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_address: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read stored entries; a missing file leaves the manager empty
    pub async fn load(&self) -> StorageResult<()> {
        let Some(file) = self.storage.load::<ConfigEntriesData>().await? else {
            debug!("No stored config entries");
            return Ok(());
        };

        info!(
            count = file.data.entries.len(),
            version = file.version,
            minor_version = file.minor_version,
            "Loaded config entries"
        );
        for entry in file.data.entries {
            self.insert(entry);
        }
        Ok(())
    }

    /// Write all entries, oldest first
    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.sorted(|_| true),
        };
        self.storage.save(&data).await?;
        debug!(count = data.entries.len(), "Saved config entries");
        Ok(())
    }

    fn sorted(&self, keep: impl Fn(&ConfigEntry) -> bool) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self
            .entries
            .iter()
            .filter(|r| keep(r.value()))
            .map(|r| r.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    fn insert(&self, entry: ConfigEntry) {
        if let Some(key) = address_key(&entry) {
            self.by_address.insert(key, entry.entry_id.clone());
        }
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn evict(&self, entry: &ConfigEntry) {
        if let Some(key) = address_key(entry) {
            self.by_address.remove(&key);
        }
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Entries of one domain, oldest first
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.sorted(|entry| entry.domain == domain)
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        let entry_id = self
            .by_address
            .get(&(domain.to_string(), unique_id.to_string()))?
            .value()
            .clone();
        self.get(&entry_id)
    }

    /// Store a new entry unless its address is already configured
    ///
    /// Nothing is kept in memory if writing to storage fails.
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        let _guard = self.write_lock.lock().await;

        if let Some((domain, unique_id)) = address_key(&entry) {
            if self.by_address.contains_key(&(domain.clone(), unique_id.clone())) {
                return Err(ConfigEntriesError::AlreadyExists { domain, unique_id });
            }
        }

        self.insert(entry.clone());
        if let Err(e) = self.save().await {
            self.evict(&entry);
            return Err(e.into());
        }

        info!(entry_id = %entry.entry_id, title = %entry.title, "Added config entry");
        Ok(entry)
    }

    /// Change title, options or the polling preference
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let _guard = self.write_lock.lock().await;

        let mut entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let ConfigEntryUpdate {
            title,
            options,
            pref_disable_polling,
        } = update;
        entry.title = title.unwrap_or(entry.title);
        entry.options = options.unwrap_or(entry.options);
        entry.pref_disable_polling = pref_disable_polling.unwrap_or(entry.pref_disable_polling);
        entry.modified_at = Utc::now();

        self.insert(entry.clone());
        self.save().await?;

        debug!(entry_id, "Updated config entry");
        Ok(entry)
    }

    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let _guard = self.write_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.evict(&entry);
        self.save().await?;

        info!(entry_id, title = %entry.title, "Removed config entry");
        Ok(entry)
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
