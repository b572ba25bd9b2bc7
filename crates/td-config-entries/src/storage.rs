//! Storage abstraction for JSON persistence
//!
//! Files live in `<config_dir>/.storage/<key>` wrapped in a versioned
//! envelope:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "core.config_entries",
//!   "data": { ... }
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Migration required for {key}: from {from} to {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - additive changes within a major version
    pub minor_version: u32,
    /// Storage key (file name)
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted under a fixed key and version
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Storage manager for the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at `<config_dir>/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Load a [`Storable`] value, or `None` if nothing was saved yet
    ///
    /// A major version other than `T::VERSION` is refused; an older minor
    /// version is accepted with a warning since minor bumps only add
    /// defaulted fields.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<StorageFile<T>>> {
        let path = self.file_path(T::KEY);

        if !self.exists(T::KEY).await {
            debug!("Storage file not found: {}", T::KEY);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;

        #[derive(Deserialize)]
        struct VersionInfo {
            version: u32,
            minor_version: u32,
        }

        let info: VersionInfo = serde_json::from_str(&content)?;
        if info.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: T::KEY.to_string(),
                from: info.version,
                to: T::VERSION,
            });
        }
        if info.minor_version < T::MINOR_VERSION {
            warn!(
                "Storage {} has older minor version ({} < {})",
                T::KEY,
                info.minor_version,
                T::MINOR_VERSION
            );
        }

        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;
        debug!(
            "Loaded storage file: {} (v{}.{})",
            T::KEY,
            storage_file.version,
            storage_file.minor_version
        );
        Ok(Some(storage_file))
    }

    /// Save a [`Storable`] value
    ///
    /// Writes to a temp file first, then renames over the target.
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;

        let storage_file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
        let content = serde_json::to_string_pretty(&storage_file)?;

        let path = self.file_path(T::KEY);
        let temp_path = self.file_path(&format!("{}.tmp", T::KEY));
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            T::KEY,
            T::VERSION,
            T::MINOR_VERSION
        );
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.exists(key).await {
            fs::remove_file(self.file_path(key)).await?;
            debug!("Deleted storage file: {}", key);
        }
        Ok(())
    }
}
