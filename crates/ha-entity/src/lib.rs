//! Entity adapters over coordinators
//!
//! An entity is a read-only projection of one device feature (a lock, a
//! temperature channel, a light) out of its coordinator's latest snapshot,
//! plus a forwarder for user commands. What an entity exposes is declared
//! as data: an [`EntityDescription`] names the vendor fields to read and the
//! [`Capability`] set that decides which commands it accepts.
//!
//! # Key Types
//!
//! - [`CoordinatorEntity`] - one adapter per (device, description)
//! - [`EntityPlatform`] - creates and retires adapters as devices come and go
//! - [`FieldMapping`] - `(vendor_field, exposed_name, transform)` table rows
//! - [`StatePublisher`] - where adapters push their states

mod capability;
mod command;
mod entity;
mod mapping;
mod payload;
mod platform;
mod publisher;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilitySet};
pub use command::{Command, CommandError, CommandHandler};
pub use entity::{CoordinatorEntity, EntityDescription, EntityState};
pub use mapping::{state_string, FieldMapping, Transform};
pub use payload::{DeviceMap, DevicePayload};
pub use platform::EntityPlatform;
pub use publisher::StatePublisher;
