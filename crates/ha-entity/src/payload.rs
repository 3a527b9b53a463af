//! Device-shaped payloads

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A snapshot payload that holds per-device fields
///
/// Entity descriptions read vendor fields by name through this trait, so an
/// integration only has to say how its payload is keyed.
pub trait DevicePayload: Send + Sync + 'static {
    /// Every device present in the payload
    fn device_ids(&self) -> Vec<String>;

    /// A field of one device; `None` when the device or field is absent
    fn field(&self, device_id: &str, field: &str) -> Option<&Value>;

    fn has_device(&self, device_id: &str) -> bool {
        self.device_ids().iter().any(|id| id == device_id)
    }
}

/// Devices keyed by id, each a JSON object of vendor fields
pub type DeviceMap = BTreeMap<String, Map<String, Value>>;

impl DevicePayload for DeviceMap {
    fn device_ids(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    /// Dotted names (`"status.battery"`) descend into nested objects
    fn field(&self, device_id: &str, field: &str) -> Option<&Value> {
        let device = self.get(device_id)?;
        let mut parts = field.split('.');
        let mut value = device.get(parts.next()?)?;
        for part in parts {
            value = value.as_object()?.get(part)?;
        }
        Some(value)
    }

    fn has_device(&self, device_id: &str) -> bool {
        self.contains_key(device_id)
    }
}
