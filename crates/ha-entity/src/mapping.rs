//! Field mapping table: `(vendor_field, exposed_name, transform)` rows
//!
//! Descriptions list the vendor fields they read up front. Each row is
//! evaluated against the snapshot payload on every read, and a missing field
//! simply drops the attribute.

use std::fmt;

use ha_core::{STATE_LOCKED, STATE_OFF, STATE_ON, STATE_UNKNOWN, STATE_UNLOCKED};
use serde_json::Value;

use crate::DevicePayload;

/// How a raw vendor value becomes an exposed value
#[derive(Clone, Copy)]
pub enum Transform {
    Identity,
    /// Truthy → `"on"`, falsy → `"off"`
    OnOff,
    /// Truthy → `"locked"`, falsy → `"unlocked"`
    Locked,
    /// Round a number to the given number of decimals
    Round(u32),
    /// Multiply a number, e.g. 0-100 % into 0-255 brightness
    Scale(f64),
    Custom(fn(&Value) -> Option<Value>),
}

impl Transform {
    pub fn apply(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Identity => Some(value.clone()),
            Self::OnOff => truthy(value).map(|on| pick(on, STATE_ON, STATE_OFF)),
            Self::Locked => truthy(value).map(|locked| pick(locked, STATE_LOCKED, STATE_UNLOCKED)),
            Self::Round(decimals) => {
                let factor = 10_f64.powi(*decimals as i32);
                let rounded = (value.as_f64()? * factor).round() / factor;
                if *decimals == 0 {
                    Some(Value::from(rounded as i64))
                } else {
                    serde_json::Number::from_f64(rounded).map(Value::Number)
                }
            }
            Self::Scale(factor) => {
                serde_json::Number::from_f64(value.as_f64()? * factor).map(Value::Number)
            }
            Self::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::OnOff => write!(f, "OnOff"),
            Self::Locked => write!(f, "Locked"),
            Self::Round(d) => write!(f, "Round({d})"),
            Self::Scale(s) => write!(f, "Scale({s})"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.as_str() {
            "on" | "true" | "locked" | "1" => Some(true),
            "off" | "false" | "unlocked" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn pick(flag: bool, yes: &str, no: &str) -> Value {
    Value::String(if flag { yes } else { no }.to_string())
}

/// One row of a description's mapping table
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    /// Field name in the vendor payload (dotted for nested fields)
    pub vendor_field: &'static str,
    /// Attribute name the host sees
    pub exposed_name: &'static str,
    pub transform: Transform,
}

impl FieldMapping {
    pub const fn new(
        vendor_field: &'static str,
        exposed_name: &'static str,
        transform: Transform,
    ) -> Self {
        Self {
            vendor_field,
            exposed_name,
            transform,
        }
    }

    /// Shorthand for a row exposing the field under its own name
    pub const fn same(vendor_field: &'static str) -> Self {
        Self::new(vendor_field, vendor_field, Transform::Identity)
    }

    pub fn evaluate<P: DevicePayload + ?Sized>(&self, payload: &P, device_id: &str) -> Option<Value> {
        payload
            .field(device_id, self.vendor_field)
            .and_then(|raw| self.transform.apply(raw))
    }
}

/// Render an exposed value as a state string
pub fn state_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { STATE_ON } else { STATE_OFF }.to_string(),
        Value::Null => STATE_UNKNOWN.to_string(),
        other => other.to_string(),
    }
}
