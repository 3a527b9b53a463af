//! Demo integration: a simulated hub wired through a coordinator
//!
//! Setting up an entry runs the coordinator's first refresh; if it fails
//! the entry is not loaded and the caller gets the [`SetupError`]. Once the
//! first refresh succeeds, one entity is created per device feature and the
//! coordinator polls at the entry's `scan_interval`.

mod descriptions;
mod hub;

use std::sync::Arc;
use std::time::Duration;

use ha_config::IntegrationConfig;
use ha_coordinator::{Coordinator, CoordinatorConfig, SetupError};
use ha_core::EntityId;
use ha_entity::{Command, CommandError, EntityPlatform, StatePublisher};
use serde_json::Value;
use tracing::{info, instrument};

pub use descriptions::{DESCRIPTIONS, HUMIDITY, LIGHT, LOCK, TEMPERATURE, THERMOSTAT};
pub use hub::{
    DemoHub, DEVICE_LIGHT, DEVICE_LOCK, DEVICE_SENSOR, DEVICE_THERMOSTAT, HVAC_MODES,
    MAX_TEMPERATURE, MIN_TEMPERATURE,
};

pub const DOMAIN: &str = "demo";

/// Fetch timeout used when the entry does not set `timeout`
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A loaded demo entry
pub struct DemoEntry {
    name: String,
    coordinator: Coordinator<DemoHub>,
    platform: EntityPlatform<DemoHub>,
}

/// Set up one demo entry and publish its entities through `publisher`
#[instrument(skip_all, fields(entry = %config.name))]
pub async fn async_setup_entry(
    config: &IntegrationConfig,
    publisher: Arc<dyn StatePublisher>,
) -> Result<DemoEntry, SetupError> {
    let hub = DemoHub::from_config(config);
    let coordinator_config = CoordinatorConfig::new(config.name.clone())
        .with_update_interval(config.scan_interval)
        .with_request_timeout(config.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT));

    let coordinator = Coordinator::setup(coordinator_config, hub).await?;
    let platform = EntityPlatform::setup(coordinator.clone(), &DESCRIPTIONS, publisher);

    info!(entities = platform.len(), "Demo entry loaded");
    Ok(DemoEntry {
        name: config.name.clone(),
        coordinator,
        platform,
    })
}

impl DemoEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coordinator(&self) -> &Coordinator<DemoHub> {
        &self.coordinator
    }

    pub fn platform(&self) -> &EntityPlatform<DemoHub> {
        &self.platform
    }

    pub fn hub(&self) -> &DemoHub {
        self.coordinator.client()
    }

    /// Handle a host service call such as `lock.unlock` on one entity
    ///
    /// The command error is returned as is. After a successful command a
    /// debounced refresh is requested: the new state shows up right away
    /// unless another refresh was requested within the cooldown, in which
    /// case it shows when the cooldown ends.
    #[instrument(skip(self, data), fields(entry = %self.name, entity_id = %entity_id))]
    pub async fn call_service(
        &self,
        entity_id: &EntityId,
        service: &str,
        data: &Value,
    ) -> Result<(), CommandError> {
        let entity = self.platform.entity_by_id(entity_id).ok_or_else(|| {
            CommandError::invalid_argument(format!("{entity_id} is not provided by {}", self.name))
        })?;
        let command = Command::from_service(service, data)?;

        entity.send_command(command).await?;
        self.coordinator.request_debounced_refresh().await;
        Ok(())
    }

    /// Remove every entity, stop polling and close the hub
    #[instrument(skip(self), fields(entry = %self.name))]
    pub async fn unload(self) {
        self.platform.unload();
        self.coordinator.teardown().await;
        info!("Demo entry unloaded");
    }
}
