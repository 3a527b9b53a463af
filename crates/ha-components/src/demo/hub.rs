//! Simulated vendor hub behind the demo integration

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use ha_config::IntegrationConfig;
use ha_coordinator::{UpdateError, VendorClient};
use ha_entity::{Command, CommandError, CommandHandler, DeviceMap};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

pub const DEVICE_LOCK: &str = "front_door";
pub const DEVICE_THERMOSTAT: &str = "hallway";
pub const DEVICE_LIGHT: &str = "living_room";
pub const DEVICE_SENSOR: &str = "outside";

pub const HVAC_MODES: [&str; 4] = ["off", "heat", "cool", "auto"];
pub const MIN_TEMPERATURE: f64 = 7.0;
pub const MAX_TEMPERATURE: f64 = 35.0;

/// How far the thermostat reading moves toward its target per fetch
const TEMPERATURE_STEP: f64 = 0.5;

/// A hub with a lock, a thermostat, a dimmable light and an outdoor sensor
///
/// State lives in memory. Commands change it immediately, but the change is
/// only seen by entities after the next fetch, like a real cloud API.
pub struct DemoHub {
    devices: Mutex<DeviceMap>,
    failures: Mutex<VecDeque<UpdateError>>,
    command_failures: Mutex<VecDeque<CommandError>>,
    unreachable: AtomicBool,
    reject_credentials: AtomicBool,
    fetches: AtomicUsize,
    closed: AtomicBool,
}

impl DemoHub {
    /// A hub with every demo device
    pub fn new() -> Self {
        Self::with_devices(&[DEVICE_LOCK, DEVICE_THERMOSTAT, DEVICE_LIGHT, DEVICE_SENSOR])
    }

    /// A hub with a subset of the demo devices; unknown ids are ignored
    pub fn with_devices(ids: &[&str]) -> Self {
        let devices = ids
            .iter()
            .filter_map(|id| initial_device(id).map(|fields| (id.to_string(), fields)))
            .collect();
        Self {
            devices: Mutex::new(devices),
            failures: Mutex::new(VecDeque::new()),
            command_failures: Mutex::new(VecDeque::new()),
            unreachable: AtomicBool::new(false),
            reject_credentials: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a hub from an `integrations:` entry
    ///
    /// Options: `devices` (list of device ids), `unreachable` (every fetch
    /// fails) and `reject_credentials` (every fetch is an auth failure).
    pub fn from_config(config: &IntegrationConfig) -> Self {
        let hub = match config.options.get("devices").and_then(Value::as_array) {
            Some(ids) => {
                let ids: Vec<&str> = ids.iter().filter_map(Value::as_str).collect();
                Self::with_devices(&ids)
            }
            None => Self::new(),
        };
        let flag = |name: &str| {
            config
                .options
                .get(name)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        hub.set_unreachable(flag("unreachable"));
        hub.set_reject_credentials(flag("reject_credentials"));
        hub
    }

    /// Make the next fetch fail with `error`; calls queue up
    pub fn fail_next(&self, error: UpdateError) {
        self.failures.lock().push_back(error);
    }

    /// Make the next command fail with `error`; calls queue up
    pub fn fail_next_command(&self, error: CommandError) {
        self.command_failures.lock().push_back(error);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_reject_credentials(&self, reject: bool) {
        self.reject_credentials.store(reject, Ordering::SeqCst);
    }

    /// Plug a device in (or reset it to its initial state)
    pub fn add_device(&self, id: &str) -> bool {
        match initial_device(id) {
            Some(fields) => {
                self.devices.lock().insert(id.to_string(), fields);
                true
            }
            None => false,
        }
    }

    pub fn remove_device(&self, id: &str) -> bool {
        self.devices.lock().remove(id).is_some()
    }

    pub fn device(&self, id: &str) -> Option<Map<String, Value>> {
        self.devices.lock().get(id).cloned()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn apply(&self, device_id: &str, command: &Command) -> Result<(), CommandError> {
        let mut devices = self.devices.lock();
        let device = devices
            .get_mut(device_id)
            .ok_or_else(|| CommandError::unreachable(format!("{device_id} is offline")))?;

        match command {
            Command::Lock => set(device, "locked", json!(true)),
            Command::Unlock => set(device, "locked", json!(false)),
            Command::TurnOn {
                brightness,
                color_temp,
            } => {
                set(device, "on", json!(true));
                if let Some(brightness) = brightness {
                    set(device, "brightness", json!(brightness));
                }
                if let Some(color_temp) = color_temp {
                    set(device, "color_temp", json!(color_temp));
                }
            }
            Command::TurnOff => set(device, "on", json!(false)),
            Command::SetTemperature(target) => {
                if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(target) {
                    return Err(CommandError::invalid_argument(format!(
                        "temperature {target} outside {MIN_TEMPERATURE}-{MAX_TEMPERATURE}"
                    )));
                }
                set(device, "target_temperature", json!(target));
            }
            Command::SetHvacMode(mode) => {
                if !HVAC_MODES.contains(&mode.as_str()) {
                    return Err(CommandError::invalid_argument(format!(
                        "unknown hvac mode '{mode}'"
                    )));
                }
                set(device, "hvac_mode", json!(mode));
            }
            Command::Custom { name, .. } => {
                return Err(CommandError::failed(format!("hub has no command '{name}'")));
            }
        }
        Ok(())
    }
}

impl Default for DemoHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VendorClient for DemoHub {
    type Data = DeviceMap;

    async fn fetch_state(&self) -> Result<DeviceMap, UpdateError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(fetch = n, "Polling demo hub");

        let scripted = self.failures.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(UpdateError::auth_failed("hub rejected credentials"));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UpdateError::connection("no route to demo hub"));
        }

        let mut devices = self.devices.lock();
        if let Some(thermostat) = devices.get_mut(DEVICE_THERMOSTAT) {
            drift_toward_target(thermostat);
        }
        Ok(devices.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("Demo hub connection closed");
    }
}

#[async_trait]
impl CommandHandler for DemoHub {
    async fn send_command(&self, device_id: &str, command: &Command) -> Result<(), CommandError> {
        let scripted = self.command_failures.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(CommandError::permission_denied("hub rejected credentials"));
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CommandError::unreachable("no route to demo hub"));
        }

        self.apply(device_id, command)?;
        debug!(device = %device_id, command = command.name(), "Demo hub accepted command");
        Ok(())
    }
}

fn set(device: &mut Map<String, Value>, field: &str, value: Value) {
    device.insert(field.to_string(), value);
}

fn initial_device(id: &str) -> Option<Map<String, Value>> {
    let fields = match id {
        DEVICE_LOCK => json!({"name": "Front Door", "locked": true, "battery": 87}),
        DEVICE_THERMOSTAT => json!({
            "name": "Hallway",
            "hvac_mode": "heat",
            "hvac_modes": HVAC_MODES,
            "target_temperature": 21.0,
            "current_temperature": 19.5
        }),
        DEVICE_LIGHT => json!({
            "name": "Living Room",
            "on": false,
            "brightness": 180,
            "color_temp": 370
        }),
        DEVICE_SENSOR => json!({"name": "Outside", "temperature": 12.3, "humidity": 64}),
        _ => return None,
    };
    match fields {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn drift_toward_target(thermostat: &mut Map<String, Value>) {
    let mode = thermostat.get("hvac_mode").and_then(Value::as_str);
    if mode == Some("off") {
        return;
    }
    let (Some(current), Some(target)) = (
        thermostat.get("current_temperature").and_then(Value::as_f64),
        thermostat.get("target_temperature").and_then(Value::as_f64),
    ) else {
        return;
    };

    let next = if (target - current).abs() <= TEMPERATURE_STEP {
        target
    } else if target > current {
        current + TEMPERATURE_STEP
    } else {
        current - TEMPERATURE_STEP
    };
    set(thermostat, "current_temperature", json!(next));
}
