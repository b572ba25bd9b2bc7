//! Config Entries
//!
//! A config entry is one configured address: the [`AddressRecord`] produced
//! by a completed address flow plus its user options (poll interval).
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single configured address
//! - [`ConfigEntries`] - Manager indexing entries by id and unique_id
//! - [`Storage`] - Versioned JSON files under `.storage/`
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.
//!
//! [`AddressRecord`]: td_core::AddressRecord

pub mod entry;
pub mod manager;
pub mod storage;

pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryUpdate, OPTION_POLL_INTERVAL};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
