//! Outbound seam to the host's state machine

use std::collections::HashMap;

use ha_core::EntityId;

/// Receives entity states from adapters
///
/// Called from coordinator listener passes, so implementations must not
/// block for long.
pub trait StatePublisher: Send + Sync {
    fn publish(
        &self,
        entity_id: &EntityId,
        state: &str,
        attributes: HashMap<String, serde_json::Value>,
    );

    /// The entity is gone (device disappeared or integration unloaded)
    fn remove(&self, entity_id: &EntityId);

    /// Whether a state is already published under this id
    fn contains(&self, _entity_id: &EntityId) -> bool {
        false
    }
}
