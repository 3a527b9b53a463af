//! Entity platform: keeps one adapter per (device, description) in step with
//! the coordinator's payload

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ha_coordinator::{Coordinator, ListenerId, VendorClient};
use ha_core::EntityId;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{CoordinatorEntity, DevicePayload, EntityDescription, StatePublisher};

/// Payload field holding a device's display name
const DEVICE_NAME_FIELD: &str = "name";

/// Adapters created from one coordinator and a description table
///
/// Devices are enumerated from every successful snapshot: new devices gain
/// entities and devices that disappeared lose theirs. A failed refresh
/// leaves the entity set alone (the entities just turn unavailable).
pub struct EntityPlatform<C: VendorClient> {
    inner: Arc<PlatformInner<C>>,
}

struct PlatformInner<C: VendorClient> {
    coordinator: Coordinator<C>,
    descriptions: &'static [&'static EntityDescription],
    publisher: Arc<dyn StatePublisher>,
    /// By unique id
    entities: DashMap<String, Arc<CoordinatorEntity<C>>>,
    listener: Mutex<Option<ListenerId>>,
    /// Serializes reconciliation with unload
    reconcile: Mutex<()>,
    unloaded: AtomicBool,
}

impl<C> EntityPlatform<C>
where
    C: VendorClient,
    C::Data: DevicePayload,
{
    /// Create entities for every device in the current snapshot and follow
    /// later snapshots
    #[instrument(skip_all, fields(coordinator = %coordinator.name()))]
    pub fn setup(
        coordinator: Coordinator<C>,
        descriptions: &'static [&'static EntityDescription],
        publisher: Arc<dyn StatePublisher>,
    ) -> Self {
        let inner = Arc::new(PlatformInner {
            coordinator,
            descriptions,
            publisher,
            entities: DashMap::new(),
            listener: Mutex::new(None),
            reconcile: Mutex::new(()),
            unloaded: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let id = inner.coordinator.add_listener(move || {
            if let Some(inner) = weak.upgrade() {
                inner.reconcile();
            }
        });
        *inner.listener.lock() = Some(id);

        inner.reconcile();
        info!(entities = inner.entities.len(), "Entity platform set up");
        Self { inner }
    }

    /// Remove every entity and stop following the coordinator
    #[instrument(skip_all, fields(coordinator = %self.inner.coordinator.name()))]
    pub fn unload(&self) {
        // Outside the reconcile lock: a running reconcile pass must finish first
        let id = self.inner.listener.lock().take();
        if let Some(id) = id {
            self.inner.coordinator.remove_listener(id);
        }

        let _guard = self.inner.reconcile.lock();
        if self.inner.unloaded.swap(true, Ordering::SeqCst) {
            return;
        }
        let unique_ids: Vec<String> = self.inner.entities.iter().map(|e| e.key().clone()).collect();
        for unique_id in unique_ids {
            if let Some((_, entity)) = self.inner.entities.remove(&unique_id) {
                self.inner.retire(&entity);
            }
        }
        info!("Entity platform unloaded");
    }

    /// Every entity, ordered by entity id
    pub fn entities(&self) -> Vec<Arc<CoordinatorEntity<C>>> {
        let mut entities: Vec<_> = self
            .inner
            .entities
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        entities.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));
        entities
    }

    pub fn entity(&self, unique_id: &str) -> Option<Arc<CoordinatorEntity<C>>> {
        self.inner.entities.get(unique_id).map(|e| Arc::clone(e.value()))
    }

    pub fn entity_by_id(&self, entity_id: &EntityId) -> Option<Arc<CoordinatorEntity<C>>> {
        self.inner
            .entities
            .iter()
            .find(|e| e.entity_id() == entity_id)
            .map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entities.is_empty()
    }

    pub fn coordinator(&self) -> &Coordinator<C> {
        &self.inner.coordinator
    }
}

impl<C> PlatformInner<C>
where
    C: VendorClient,
    C::Data: DevicePayload,
{
    fn reconcile(&self) {
        let _guard = self.reconcile.lock();
        if self.unloaded.load(Ordering::SeqCst) {
            return;
        }
        let Some(snapshot) = self.coordinator.last_snapshot() else {
            return;
        };
        let Some(payload) = snapshot.payload() else {
            return;
        };

        let mut present = HashSet::new();
        for device_id in payload.device_ids() {
            for &description in self.descriptions {
                if !description.applies_to(payload, &device_id) {
                    continue;
                }
                let unique_id = description.unique_id(&device_id);
                present.insert(unique_id.clone());
                if self.entities.contains_key(&unique_id) {
                    continue;
                }
                if let Some(entity) = self.create(payload, &device_id, description) {
                    self.entities.insert(unique_id, Arc::clone(&entity));
                    info!(entity_id = %entity.entity_id(), device = %device_id, "Added entity");
                    entity.added_to_host();
                }
            }
        }

        let stale: Vec<String> = self
            .entities
            .iter()
            .filter(|e| !present.contains(e.key()))
            .map(|e| e.key().clone())
            .collect();
        for unique_id in stale {
            if let Some((_, entity)) = self.entities.remove(&unique_id) {
                self.retire(&entity);
            }
        }
    }

    fn create(
        &self,
        payload: &C::Data,
        device_id: &str,
        description: &'static EntityDescription,
    ) -> Option<Arc<CoordinatorEntity<C>>> {
        let device_name = payload
            .field(device_id, DEVICE_NAME_FIELD)
            .and_then(Value::as_str)
            .unwrap_or(device_id);
        let name = description.entity_name(device_name);

        let base = match EntityId::from_name(description.domain, &name) {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    device = %device_id,
                    key = description.key,
                    error = %err,
                    "Skipping entity with invalid id"
                );
                return None;
            }
        };
        let entity_id = self.allocate(base);

        Some(Arc::new(
            CoordinatorEntity::new(
                self.coordinator.clone(),
                description,
                device_id,
                entity_id,
                Arc::clone(&self.publisher),
            )
            .with_name(name),
        ))
    }

    /// First free id among `base`, `base_2`, `base_3`, ...
    fn allocate(&self, base: EntityId) -> EntityId {
        let taken = |id: &EntityId| {
            self.entities.iter().any(|e| e.entity_id() == id) || self.publisher.contains(id)
        };
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = base.with_suffix(n);
            if !taken(&candidate) {
                debug!(requested = %base, allocated = %candidate, "Entity id already taken");
                return candidate;
            }
            n += 1;
        }
    }

    fn retire(&self, entity: &CoordinatorEntity<C>) {
        entity.will_remove_from_host();
        self.publisher.remove(entity.entity_id());
        info!(entity_id = %entity.entity_id(), "Removed entity");
    }
}
