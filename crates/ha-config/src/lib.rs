//! YAML configuration loading
//!
//! `configuration.yaml` is read through a loader that resolves the custom
//! tags before anything is parsed:
//!
//! - `!include path` - include another YAML file
//! - `!secret key` - substitute from secrets.yaml
//! - `!env_var NAME [default]` - environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use ha_config::load_config;
//!
//! let config = load_config("/config")?;
//! for entry in &config.integrations {
//!     println!("{} every {:?}", entry.name, entry.scan_interval);
//! }
//! ```

mod app_config;
mod error;
mod loader;
mod secrets;

pub use app_config::{
    load_config, parse_interval, AppConfig, IntegrationConfig, LogLevel, LoggerConfig,
    CONFIG_FILE, DEFAULT_SCAN_INTERVAL,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;
