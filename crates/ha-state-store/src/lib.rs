//! Entity state storage with domain indexing
//!
//! The StateStore is the host-side sink entity adapters publish into. It
//! keeps the current state of every entity, indexes them by domain, and
//! broadcasts a [`StateChanged`] for every write that changes something.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ha_core::{Context, EntityId, State};
use ha_entity::StatePublisher;
use tokio::sync::broadcast;
use tracing::{debug, instrument, trace};

/// Capacity of the state-changed channel; slow receivers see `Lagged`
pub const STATE_CHANGED_CAPACITY: usize = 256;

/// A state write or removal
#[derive(Debug, Clone)]
pub struct StateChanged {
    pub entity_id: EntityId,
    pub old_state: Option<State>,
    /// `None` when the entity was removed
    pub new_state: Option<State>,
}

/// The state store tracks all entity states
///
/// The StateStore is responsible for:
/// - Storing the current state of all entities
/// - Maintaining a domain index for domain-based queries
/// - Broadcasting state changes to subscribers
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, State>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    changes: broadcast::Sender<StateChanged>,
}

impl StateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(STATE_CHANGED_CAPACITY);
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            changes,
        }
    }

    /// Set the state of an entity
    ///
    /// `last_changed` only moves when the state string changes. Writing the
    /// same state and attributes again is a no-op and broadcasts nothing.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        // The entry stays locked from read to write
        let (old_state, new_state) = match self.states.entry(entity_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let new_state = entry.get().with_update(state, attributes, context);
                if *entry.get() == new_state {
                    trace!("State unchanged");
                    return entry.get().clone();
                }
                let old_state = entry.insert(new_state.clone());
                (Some(old_state), new_state)
            }
            Entry::Vacant(entry) => {
                let new_state = State::new(entity_id.clone(), state, attributes, context);
                self.domain_index
                    .entry(entity_id.domain().to_string())
                    .or_default()
                    .push(entry.key().clone());
                entry.insert(new_state.clone());
                (None, new_state)
            }
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map_or(true, |s| s.state != new_state.state),
            "Setting entity state"
        );

        self.broadcast(StateChanged {
            entity_id,
            old_state,
            new_state: Some(new_state.clone()),
        });
        new_state
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get the state value as a string, or None if entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get_state(entity_id).as_deref() == Some(state)
    }

    /// Get all entity IDs for a domain
    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn domain_states(&self, domain: &str) -> Vec<State> {
        self.entity_ids(domain)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<State> {
        self.states.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove an entity's state, broadcasting a change with no new state
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<State> {
        let old_state = match self.states.entry(entity_id.to_string()) {
            Entry::Occupied(entry) => {
                if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                    ids.retain(|id| id != entry.key());
                }
                Some(entry.remove())
            }
            Entry::Vacant(_) => None,
        };

        if let Some(state) = &old_state {
            trace!("Removing entity state");
            self.broadcast(StateChanged {
                entity_id: entity_id.clone(),
                old_state: Some(state.clone()),
                new_state: None,
            });
        }
        old_state
    }

    /// Receive every subsequent state change
    pub fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.changes.subscribe()
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }

    fn broadcast(&self, change: StateChanged) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePublisher for StateStore {
    fn publish(
        &self,
        entity_id: &EntityId,
        state: &str,
        attributes: HashMap<String, serde_json::Value>,
    ) {
        self.set(entity_id.clone(), state, attributes, Context::new());
    }

    fn remove(&self, entity_id: &EntityId) {
        StateStore::remove(self, entity_id);
    }

    fn contains(&self, entity_id: &EntityId) -> bool {
        self.states.contains_key(&entity_id.to_string())
    }
}

/// Thread-safe wrapper for StateStore
pub type SharedStateStore = Arc<StateStore>;
