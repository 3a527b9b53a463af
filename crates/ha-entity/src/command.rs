//! Commands: user requests forwarded to the vendor client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Capability;

/// A user command addressed to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data", rename_all = "snake_case")]
pub enum Command {
    TurnOn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        brightness: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color_temp: Option<u16>,
    },
    TurnOff,
    Lock,
    Unlock,
    SetTemperature(f64),
    SetHvacMode(String),
    /// Vendor-specific command; no capability required
    Custom {
        name: String,
        #[serde(default)]
        args: Value,
    },
}

impl Command {
    pub fn name(&self) -> &str {
        match self {
            Self::TurnOn { .. } => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::SetTemperature(_) => "set_temperature",
            Self::SetHvacMode(_) => "set_hvac_mode",
            Self::Custom { name, .. } => name.as_str(),
        }
    }

    /// Capabilities an entity needs to accept this command
    pub fn required_capabilities(&self) -> Vec<Capability> {
        match self {
            Self::TurnOn {
                brightness,
                color_temp,
            } => {
                let mut required = vec![Capability::OnOff];
                if brightness.is_some() {
                    required.push(Capability::Brightness);
                }
                if color_temp.is_some() {
                    required.push(Capability::ColorTemp);
                }
                required
            }
            Self::TurnOff => vec![Capability::OnOff],
            Self::Lock | Self::Unlock => vec![Capability::Lock],
            Self::SetTemperature(_) => vec![Capability::TargetTemperature],
            Self::SetHvacMode(_) => vec![Capability::HvacMode],
            Self::Custom { .. } => Vec::new(),
        }
    }

    /// Build a command from a host service call (`lock.lock`, `light.turn_on`)
    ///
    /// Unknown service names become [`Command::Custom`] carrying the call data.
    pub fn from_service(service: &str, data: &Value) -> Result<Self, CommandError> {
        let command = match service {
            "turn_on" => Self::TurnOn {
                brightness: optional_int(data, "brightness")?,
                color_temp: optional_int(data, "color_temp")?,
            },
            "turn_off" => Self::TurnOff,
            "lock" => Self::Lock,
            "unlock" => Self::Unlock,
            "set_temperature" => {
                let temperature = data
                    .get("temperature")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| CommandError::invalid_argument("temperature is required"))?;
                Self::SetTemperature(temperature)
            }
            "set_hvac_mode" => {
                let mode = data
                    .get("hvac_mode")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CommandError::invalid_argument("hvac_mode is required"))?;
                Self::SetHvacMode(mode.to_string())
            }
            other => Self::Custom {
                name: other.to_string(),
                args: data.clone(),
            },
        };
        Ok(command)
    }
}

fn optional_int<T: TryFrom<u64>>(data: &Value, key: &str) -> Result<Option<T>, CommandError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| CommandError::invalid_argument(format!("{key} is out of range"))),
    }
}

/// Why a command did not go through
///
/// Vendor errors reach the caller exactly as the client returned them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The entity lacks a capability the command needs
    #[error("{entity_id} does not support {command} (missing {missing})")]
    NotSupported {
        entity_id: String,
        command: String,
        missing: &'static str,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device unreachable: {0}")]
    Unreachable(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("command failed: {0}")]
    Failed(String),
}

impl CommandError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Command side of a vendor client
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn send_command(&self, device_id: &str, command: &Command) -> Result<(), CommandError>;
}
