//! YAML configuration for the outage service
//!
//! `configuration.yaml` is loaded from the config directory with support
//! for three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use td_config::ServiceConfig;
//!
//! let config = ServiceConfig::load("/config")?;
//! println!("polling every {} minutes", config.integration.poll_interval);
//! ```

mod error;
mod integration;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use integration::{
    EndpointOverrides, HttpConfig, IntegrationConfig, ServiceConfig, CONFIG_FILE,
    DEFAULT_BASE_URL, INTEGRATION_SECTION,
};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};

pub use serde_yaml::Value;
