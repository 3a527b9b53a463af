//! Application configuration: the `logger:` and `integrations:` sections of
//! `configuration.yaml`

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

pub const CONFIG_FILE: &str = "configuration.yaml";

/// Refresh interval when an integration does not set `scan_interval`
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub logger: LoggerConfig,
    pub integrations: Vec<IntegrationConfig>,
}

impl AppConfig {
    /// Load `configuration.yaml` from a config directory
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let yaml = load_yaml(config_dir.as_ref(), CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        let root = yaml
            .as_mapping()
            .ok_or_else(|| ConfigError::invalid("root", "configuration must be a mapping"))?;

        let logger = match root.get("logger") {
            None | Some(Value::Null) => LoggerConfig::default(),
            Some(section) => serde_yaml::from_value(section.clone())
                .map_err(|e| ConfigError::invalid("logger", e))?,
        };

        let integrations = match root.get("integrations") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| IntegrationConfig::from_yaml(index, entry))
                .collect::<ConfigResult<Vec<_>>>()?,
            Some(_) => return Err(ConfigError::invalid("integrations", "must be a list")),
        };

        debug!(integrations = integrations.len(), "Parsed configuration");
        Ok(Self {
            logger,
            integrations,
        })
    }
}

/// `load_config(dir)` is [`AppConfig::load`]
pub fn load_config(config_dir: impl AsRef<Path>) -> ConfigResult<AppConfig> {
    AppConfig::load(config_dir)
}

/// Log levels accepted by the `logger:` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "fatal")]
    Critical,
    Error,
    #[serde(alias = "warn")]
    Warning,
    Info,
    Debug,
    #[serde(alias = "trace")]
    Notset,
}

impl LogLevel {
    /// The `tracing` level name this maps to
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Notset => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub default: LogLevel,
    /// Per-target overrides; `ha_coordinator` or `ha_components.demo`
    #[serde(default)]
    pub logs: BTreeMap<String, LogLevel>,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            logs: BTreeMap::new(),
        }
    }
}

impl LoggerConfig {
    /// `EnvFilter` directives, e.g. `info,ha_coordinator=debug`
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default.as_directive().to_string()];
        directives.extend(self.logs.iter().map(|(target, level)| {
            format!("{}={}", target.replace('.', "::"), level.as_directive())
        }));
        directives.join(",")
    }
}

/// One entry of the `integrations:` list
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationConfig {
    pub platform: String,
    /// Display name; defaults to the platform
    pub name: String,
    pub scan_interval: Duration,
    /// Upper bound on a single vendor fetch
    pub timeout: Option<Duration>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Free-form vendor options
    pub options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntegration {
    platform: Option<String>,
    name: Option<String>,
    scan_interval: Option<Value>,
    timeout: Option<Value>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    options: serde_json::Map<String, serde_json::Value>,
}

impl IntegrationConfig {
    /// A config with defaults for everything but the platform
    pub fn new(platform: impl Into<String>) -> Self {
        let platform = platform.into();
        Self {
            name: platform.clone(),
            platform,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            timeout: None,
            host: None,
            port: None,
            username: None,
            password: None,
            options: serde_json::Map::new(),
        }
    }

    fn from_yaml(index: usize, entry: &Value) -> ConfigResult<Self> {
        let key = |field: &str| format!("integrations[{index}].{field}");

        let raw: RawIntegration = serde_yaml::from_value(entry.clone())
            .map_err(|e| ConfigError::invalid(format!("integrations[{index}]"), e))?;
        let platform = raw
            .platform
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: key("platform"),
            })?;

        let scan_interval = match raw.scan_interval {
            Some(value) => {
                parse_interval(&value).map_err(|reason| ConfigError::invalid(key("scan_interval"), reason))?
            }
            None => DEFAULT_SCAN_INTERVAL,
        };
        let timeout = raw
            .timeout
            .map(|value| parse_interval(&value))
            .transpose()
            .map_err(|reason| ConfigError::invalid(key("timeout"), reason))?;

        Ok(Self {
            name: raw.name.unwrap_or_else(|| platform.clone()),
            platform,
            scan_interval,
            timeout,
            host: raw.host,
            port: raw.port,
            username: raw.username,
            password: raw.password,
            options: raw.options,
        })
    }
}

/// Parse an interval: seconds (`30`, `2.5`), `"HH:MM:SS"` / `"MM:SS"`, or a
/// mapping of `days`/`hours`/`minutes`/`seconds`/`milliseconds`
///
/// Zero and negative intervals are rejected.
pub fn parse_interval(value: &Value) -> Result<Duration, String> {
    let seconds = match value {
        Value::Number(n) => n.as_f64().ok_or("not a number")?,
        Value::String(s) => parse_clock(s)?,
        Value::Mapping(map) => {
            let mut total = 0.0;
            for (unit, amount) in map {
                let unit = unit.as_str().ok_or("time unit must be a string")?;
                let factor = match unit {
                    "days" => 86_400.0,
                    "hours" => 3_600.0,
                    "minutes" => 60.0,
                    "seconds" => 1.0,
                    "milliseconds" => 0.001,
                    other => return Err(format!("unknown time unit '{other}'")),
                };
                let amount = amount
                    .as_f64()
                    .ok_or_else(|| format!("'{unit}' must be a number"))?;
                total += amount * factor;
            }
            total
        }
        _ => return Err("expected seconds, \"HH:MM:SS\" or a mapping".to_string()),
    };

    if seconds.is_nan() || seconds <= 0.0 {
        return Err(format!("interval must be positive, got {seconds}"));
    }
    let interval = Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err(format!("interval {seconds}s is shorter than a nanosecond"));
    }
    Ok(interval)
}

fn parse_clock(text: &str) -> Result<f64, String> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() > 3 {
        return Err(format!("'{text}' is not HH:MM:SS"));
    }
    parts.iter().try_fold(0.0, |total, part| {
        let n: f64 = part
            .trim()
            .parse()
            .map_err(|_| format!("'{text}' is not HH:MM:SS"))?;
        Ok(total * 60.0 + n)
    })
}
