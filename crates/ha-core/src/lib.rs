//! Core types for coordinator-backed integrations
//!
//! This crate provides the small set of types every other crate in the
//! workspace agrees on: the `EntityId` an adapter publishes under, the
//! `State` the host stores for it, and the `Context` that tags each write.

mod context;
mod entity_id;
mod slug;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use slug::slugify;
pub use state::State;

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State published while the backing coordinator has no usable data
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State published when the value is known to be missing
pub const STATE_UNKNOWN: &str = "unknown";

pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
pub const STATE_LOCKED: &str = "locked";
pub const STATE_UNLOCKED: &str = "unlocked";
