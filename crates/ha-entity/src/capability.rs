//! Capability set: what an entity can do, as data instead of type hierarchy

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single feature an entity may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    OnOff,
    Brightness,
    ColorTemp,
    Lock,
    TargetTemperature,
    HvacMode,
    Measurement,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnOff => "on_off",
            Self::Brightness => "brightness",
            Self::ColorTemp => "color_temp",
            Self::Lock => "lock",
            Self::TargetTemperature => "target_temperature",
            Self::HvacMode => "hvac_mode",
            Self::Measurement => "measurement",
        }
    }
}

/// The capabilities of one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// The first of `required` that this set lacks
    pub fn first_missing(
        &self,
        required: impl IntoIterator<Item = Capability>,
    ) -> Option<Capability> {
        required.into_iter().find(|c| !self.contains(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Capability names for the `supported_features` state attribute
    pub fn to_attribute(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.iter()
                .map(|c| serde_json::Value::String(c.as_str().to_string()))
                .collect(),
        )
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a Capability>>(iter: I) -> Self {
        Self(iter.into_iter().copied().collect())
    }
}
