//! Service configuration
//!
//! Parses the `tauron_dystrybucja:` and `http:` sections of
//! `configuration.yaml`. Every key is optional.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Main configuration file name
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Section key for the integration
pub const INTEGRATION_SECTION: &str = "tauron_dystrybucja";

pub const DEFAULT_BASE_URL: &str = "https://www.tauron-dystrybucja.pl/waapi";

/// Optional endpoint path overrides; unset paths keep the client defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EndpointOverrides {
    pub cities: Option<String>,
    pub streets: Option<String>,
    pub house_numbers: Option<String>,
    pub flat_numbers: Option<String>,
    pub outages: Option<String>,
}

/// The `tauron_dystrybucja:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub base_url: String,
    /// Seconds
    pub request_timeout: u64,
    /// Minutes; default for entries without their own interval
    pub poll_interval: u32,
    pub outage_window_days: u32,
    pub min_query_length: usize,
    pub dedup_display_names: bool,
    pub auto_select_single_match: bool,
    pub endpoints: EndpointOverrides,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: 10,
            poll_interval: 60,
            outage_window_days: 7,
            min_query_length: 3,
            dedup_display_names: false,
            auto_select_single_match: false,
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl IntegrationConfig {
    fn validate(&self) -> ConfigResult<()> {
        let key = |field: &str| format!("{}.{}", INTEGRATION_SECTION, field);

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key("base_url"),
                reason: "must not be empty".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: key("base_url"),
                reason: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: key("request_timeout"),
                reason: "must be positive".to_string(),
            });
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue {
                key: key("poll_interval"),
                reason: "must be positive".to_string(),
            });
        }
        if self.outage_window_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: key("outage_window_days"),
                reason: "must be positive".to_string(),
            });
        }
        if self.min_query_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: key("min_query_length"),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// The `http:` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub server_host: String,
    pub server_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8123,
        }
    }
}

/// Everything the service reads from `configuration.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub integration: IntegrationConfig,
    pub http: HttpConfig,
}

impl ServiceConfig {
    /// Load from a config directory; a missing `configuration.yaml` yields
    /// the defaults
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            tracing::info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }

        let mapping = yaml.as_mapping().ok_or_else(|| ConfigError::InvalidValue {
            key: "root".to_string(),
            reason: "configuration must be a mapping".to_string(),
        })?;

        let integration: IntegrationConfig = section(mapping, INTEGRATION_SECTION)?;
        integration.validate()?;

        let http: HttpConfig = section(mapping, "http")?;

        Ok(Self { integration, http })
    }
}

/// Deserialize a top-level section; absent or empty sections take defaults
fn section<T>(mapping: &serde_yaml::Mapping, key: &str) -> ConfigResult<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match mapping.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            }
        }),
    }
}
