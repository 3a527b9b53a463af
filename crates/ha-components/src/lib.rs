//! Integrations built on the coordinator pattern
//!
//! Each integration pairs a vendor client with an entity description table
//! and exposes `async_setup_entry` / `unload` for the host.

pub mod demo;

pub use demo::{async_setup_entry, DemoEntry, DemoHub};

/// Platforms this crate can set up
pub const PLATFORMS: &[&str] = &[demo::DOMAIN];
