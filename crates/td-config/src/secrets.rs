//! `secrets.yaml` lookup for `!secret` tags

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up next to `configuration.yaml`
pub const SECRETS_FILE: &str = "secrets.yaml";

/// Flat key/value secrets, every scalar stored as its string form
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
    path: Option<PathBuf>,
}

impl Secrets {
    /// Load `secrets.yaml` from the config directory; a missing file yields
    /// an empty store
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);

        if !path.exists() {
            debug!("No {} in {:?}", SECRETS_FILE, config_dir);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        let mut secrets = Self::parse(&content, &path)?;
        debug!("Loaded {} secrets from {:?}", secrets.len(), path);
        secrets.path = Some(path);
        Ok(secrets)
    }

    fn parse(content: &str, path: &Path) -> ConfigResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let raw: Option<HashMap<String, Value>> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
                path: path.to_path_buf(),
                source: e,
            })?;

        let values = raw
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, scalar_to_string(value)))
            .collect();

        Ok(Self { values, path: None })
    }

    pub fn get(&self, key: &str) -> ConfigResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Where the secrets came from, if a file was found
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(&other)
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}
