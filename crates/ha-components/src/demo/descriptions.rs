//! What the demo hub's devices expose

use ha_entity::{Capability, EntityDescription, FieldMapping, Transform};

pub static LOCK: EntityDescription = EntityDescription {
    key: "lock",
    domain: "lock",
    name: None,
    state: FieldMapping::new("locked", "state", Transform::Locked),
    attributes: &[FieldMapping::new("battery", "battery_level", Transform::Identity)],
    capabilities: &[Capability::Lock],
};

pub static THERMOSTAT: EntityDescription = EntityDescription {
    key: "climate",
    domain: "climate",
    name: None,
    state: FieldMapping::same("hvac_mode"),
    attributes: &[
        FieldMapping::new("target_temperature", "temperature", Transform::Round(1)),
        FieldMapping::new("current_temperature", "current_temperature", Transform::Round(1)),
        FieldMapping::same("hvac_modes"),
    ],
    capabilities: &[Capability::TargetTemperature, Capability::HvacMode],
};

pub static LIGHT: EntityDescription = EntityDescription {
    key: "light",
    domain: "light",
    name: None,
    state: FieldMapping::new("on", "state", Transform::OnOff),
    attributes: &[FieldMapping::same("brightness"), FieldMapping::same("color_temp")],
    capabilities: &[Capability::OnOff, Capability::Brightness, Capability::ColorTemp],
};

pub static TEMPERATURE: EntityDescription = EntityDescription {
    key: "temperature",
    domain: "sensor",
    name: Some("Temperature"),
    state: FieldMapping::new("temperature", "state", Transform::Round(1)),
    attributes: &[],
    capabilities: &[Capability::Measurement],
};

pub static HUMIDITY: EntityDescription = EntityDescription {
    key: "humidity",
    domain: "sensor",
    name: Some("Humidity"),
    state: FieldMapping::new("humidity", "state", Transform::Round(0)),
    attributes: &[],
    capabilities: &[Capability::Measurement],
};

pub static DESCRIPTIONS: [&EntityDescription; 5] =
    [&LOCK, &THERMOSTAT, &LIGHT, &TEMPERATURE, &HUMIDITY];
