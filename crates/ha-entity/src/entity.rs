//! Coordinator entity: the read projection plus command forwarder

use std::collections::HashMap;
use std::sync::Arc;

use ha_coordinator::{Coordinator, ListenerId, VendorClient};
use ha_core::{EntityId, STATE_UNAVAILABLE};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{
    state_string, Capability, CapabilitySet, Command, CommandError, CommandHandler, DevicePayload,
    FieldMapping, StatePublisher,
};

/// Declares one kind of entity a device can expose
///
/// Integrations keep these in static tables; a description applies to every
/// device whose payload carries the state field.
#[derive(Debug)]
pub struct EntityDescription {
    /// Stable key, unique within an integration (`"lock"`, `"temperature"`)
    pub key: &'static str,
    /// Host domain of the entity (`"lock"`, `"sensor"`, `"light"`)
    pub domain: &'static str,
    /// Appended to the device name; `None` names the entity after its device
    pub name: Option<&'static str>,
    /// Field that becomes the state string
    pub state: FieldMapping,
    pub attributes: &'static [FieldMapping],
    pub capabilities: &'static [Capability],
}

impl EntityDescription {
    pub fn applies_to<P: DevicePayload + ?Sized>(&self, payload: &P, device_id: &str) -> bool {
        payload.field(device_id, self.state.vendor_field).is_some()
    }

    /// `<device_id>-<key>`
    pub fn unique_id(&self, device_id: &str) -> String {
        format!("{}-{}", device_id, self.key)
    }

    /// Display name for a device: `"<device> <name>"`
    pub fn entity_name(&self, device_name: &str) -> String {
        match self.name {
            Some(name) => format!("{device_name} {name}"),
            None => device_name.to_string(),
        }
    }
}

/// The exposed value of an entity at one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub state: String,
    pub attributes: HashMap<String, Value>,
}

/// Adapter for one (device, description) pair
///
/// Holds no copy of device data: every read goes through the coordinator's
/// latest snapshot, so a refresh is visible to all adapters at once.
pub struct CoordinatorEntity<C: VendorClient> {
    coordinator: Coordinator<C>,
    description: &'static EntityDescription,
    device_id: String,
    unique_id: String,
    entity_id: EntityId,
    name: String,
    capabilities: CapabilitySet,
    publisher: Arc<dyn StatePublisher>,
    listener: Mutex<Option<ListenerId>>,
}

impl<C> CoordinatorEntity<C>
where
    C: VendorClient,
    C::Data: DevicePayload,
{
    pub fn new(
        coordinator: Coordinator<C>,
        description: &'static EntityDescription,
        device_id: impl Into<String>,
        entity_id: EntityId,
        publisher: Arc<dyn StatePublisher>,
    ) -> Self {
        let device_id = device_id.into();
        Self {
            unique_id: description.unique_id(&device_id),
            name: description.entity_name(&device_id),
            capabilities: description.capabilities.iter().collect(),
            coordinator,
            description,
            device_id,
            entity_id,
            publisher,
            listener: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `<device_id>-<key>`; stable across restarts and renames
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &'static EntityDescription {
        self.description
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn coordinator(&self) -> &Coordinator<C> {
        &self.coordinator
    }

    /// Entities are pushed by their coordinator, never polled by the host
    pub fn should_poll(&self) -> bool {
        false
    }

    /// The exposed value, read from the latest snapshot
    ///
    /// `None` when there is no snapshot yet, the last refresh failed, or the
    /// device (or its state field) is missing from the payload.
    pub fn current_value(&self) -> Option<EntityState> {
        let snapshot = self.coordinator.last_snapshot()?;
        let payload = snapshot.payload()?;
        let state = self.description.state.evaluate(payload, &self.device_id)?;

        let mut attributes: HashMap<String, Value> = self
            .description
            .attributes
            .iter()
            .filter_map(|row| {
                row.evaluate(payload, &self.device_id)
                    .map(|value| (row.exposed_name.to_string(), value))
            })
            .collect();
        self.base_attributes(&mut attributes);

        Some(EntityState {
            state: state_string(&state),
            attributes,
        })
    }

    /// Whether [`current_value`](Self::current_value) can produce a state
    pub fn available(&self) -> bool {
        self.current_value().is_some()
    }

    /// Ask the coordinator for a refresh; requests within the cooldown are
    /// collapsed
    pub async fn update(&self) {
        self.coordinator.request_debounced_refresh().await;
    }

    /// Push the current value (or `unavailable`) to the publisher
    pub fn on_coordinator_update(&self) {
        match self.current_value() {
            Some(value) => {
                self.publisher
                    .publish(&self.entity_id, &value.state, value.attributes);
            }
            None => {
                let mut attributes = HashMap::new();
                self.base_attributes(&mut attributes);
                self.publisher
                    .publish(&self.entity_id, STATE_UNAVAILABLE, attributes);
            }
        }
    }

    /// Subscribe to the coordinator and publish the initial state
    pub fn added_to_host(self: &Arc<Self>) {
        let entity = Arc::downgrade(self);
        let id = self.coordinator.add_listener(move || {
            if let Some(entity) = entity.upgrade() {
                entity.on_coordinator_update();
            }
        });
        if let Some(previous) = self.listener.lock().replace(id) {
            self.coordinator.remove_listener(previous);
        }
        trace!(entity_id = %self.entity_id, "Entity subscribed to coordinator");
        self.on_coordinator_update();
    }

    /// Unsubscribe; no publish happens for this entity after it returns
    pub fn will_remove_from_host(&self) {
        let id = self.listener.lock().take();
        if let Some(id) = id {
            self.coordinator.remove_listener(id);
            trace!(entity_id = %self.entity_id, "Entity unsubscribed from coordinator");
        }
    }

    fn base_attributes(&self, attributes: &mut HashMap<String, Value>) {
        attributes.insert("friendly_name".to_string(), Value::String(self.name.clone()));
        if !self.capabilities.is_empty() {
            attributes.insert(
                "supported_features".to_string(),
                self.capabilities.to_attribute(),
            );
        }
    }
}

impl<C> CoordinatorEntity<C>
where
    C: VendorClient + CommandHandler,
    C::Data: DevicePayload,
{
    /// Forward a command to the vendor client
    ///
    /// The command is checked against the capability set first. Vendor
    /// errors are returned unchanged, and no refresh is triggered: call
    /// [`update`](Self::update) afterwards for an immediate re-read.
    pub async fn send_command(&self, command: Command) -> Result<(), CommandError> {
        if let Some(missing) = self
            .capabilities
            .first_missing(command.required_capabilities())
        {
            warn!(
                entity_id = %self.entity_id,
                command = command.name(),
                missing = missing.as_str(),
                "Command not supported by entity"
            );
            return Err(CommandError::NotSupported {
                entity_id: self.entity_id.to_string(),
                command: command.name().to_string(),
                missing: missing.as_str(),
            });
        }

        debug!(entity_id = %self.entity_id, command = command.name(), "Sending command");
        self.coordinator
            .client()
            .send_command(&self.device_id, &command)
            .await
    }
}
