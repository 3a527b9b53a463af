//! Fakes shared by the adapter and platform tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ha_coordinator::{UpdateError, VendorClient};
use ha_core::EntityId;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    Capability, Command, CommandError, CommandHandler, DeviceMap, EntityDescription, FieldMapping,
    StatePublisher, Transform,
};

pub static LOCK: EntityDescription = EntityDescription {
    key: "lock",
    domain: "lock",
    name: None,
    state: FieldMapping::new("locked", "state", Transform::Locked),
    attributes: &[FieldMapping::same("battery")],
    capabilities: &[Capability::Lock],
};

pub static LIGHT: EntityDescription = EntityDescription {
    key: "light",
    domain: "light",
    name: None,
    state: FieldMapping::new("on", "state", Transform::OnOff),
    attributes: &[FieldMapping::same("brightness")],
    capabilities: &[Capability::OnOff, Capability::Brightness],
};

pub static THERMOSTAT: EntityDescription = EntityDescription {
    key: "climate",
    domain: "climate",
    name: Some("Thermostat"),
    state: FieldMapping::same("mode"),
    attributes: &[
        FieldMapping::new("target", "temperature", Transform::Round(1)),
        FieldMapping::new("current", "current_temperature", Transform::Round(1)),
        FieldMapping::same("humidity"),
    ],
    capabilities: &[Capability::TargetTemperature, Capability::HvacMode],
};

pub static ALL: [&EntityDescription; 3] = [&LOCK, &LIGHT, &THERMOSTAT];

/// In-memory hub whose devices the test edits directly
pub struct FakeHub {
    devices: Mutex<DeviceMap>,
    next_error: Mutex<Option<UpdateError>>,
    command_error: Mutex<Option<CommandError>>,
    commands: Mutex<Vec<(String, Command)>>,
    fetches: AtomicUsize,
}

impl FakeHub {
    pub fn new(devices: Value) -> Self {
        Self {
            devices: Mutex::new(serde_json::from_value(devices).unwrap()),
            next_error: Mutex::new(None),
            command_error: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, error: UpdateError) {
        *self.next_error.lock() = Some(error);
    }

    pub fn fail_commands(&self, error: CommandError) {
        *self.command_error.lock() = Some(error);
    }

    pub fn set_field(&self, device_id: &str, field: &str, value: Value) {
        self.devices
            .lock()
            .entry(device_id.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    pub fn remove_device(&self, device_id: &str) {
        self.devices.lock().remove(device_id);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(String, Command)> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl VendorClient for FakeHub {
    type Data = DeviceMap;

    async fn fetch_state(&self) -> Result<DeviceMap, UpdateError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_error.lock().take() {
            return Err(err);
        }
        Ok(self.devices.lock().clone())
    }
}

#[async_trait]
impl CommandHandler for FakeHub {
    async fn send_command(&self, device_id: &str, command: &Command) -> Result<(), CommandError> {
        if let Some(err) = self.command_error.lock().clone() {
            return Err(err);
        }
        self.commands
            .lock()
            .push((device_id.to_string(), command.clone()));
        match command {
            Command::Lock => self.set_field(device_id, "locked", Value::Bool(true)),
            Command::Unlock => self.set_field(device_id, "locked", Value::Bool(false)),
            _ => {}
        }
        Ok(())
    }
}

/// Publisher that keeps every call for inspection
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(EntityId, String, HashMap<String, Value>)>>,
    removed: Mutex<Vec<EntityId>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(EntityId, String, HashMap<String, Value>)> {
        self.published.lock().clone()
    }

    pub fn removed(&self) -> Vec<EntityId> {
        self.removed.lock().clone()
    }

    pub fn latest_state(&self, entity_id: &EntityId) -> Option<String> {
        self.published
            .lock()
            .iter()
            .rev()
            .find(|(id, _, _)| id == entity_id)
            .map(|(_, state, _)| state.clone())
    }
}

impl StatePublisher for RecordingPublisher {
    fn publish(&self, entity_id: &EntityId, state: &str, attributes: HashMap<String, Value>) {
        self.published
            .lock()
            .push((entity_id.clone(), state.to_string(), attributes));
    }

    fn remove(&self, entity_id: &EntityId) {
        self.removed.lock().push(entity_id.clone());
    }
}
