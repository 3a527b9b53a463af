//! Data update coordinator
//!
//! A [`Coordinator`] owns one device's (or account's) polled state. It runs
//! a single periodic refresh against a [`VendorClient`], keeps the latest
//! [`Snapshot`], collapses concurrent refresh requests into one vendor call
//! and fans completion out to registered listeners.
//!
//! # Key Types
//!
//! - [`Coordinator`] - refresh scheduling, de-duplication, debouncing and lifecycle
//! - [`Snapshot`] - immutable outcome of one refresh
//! - [`VendorClient`] - the external SDK binding a coordinator polls
//! - [`Listeners`] - the observer list behind `add_listener`
//!
//! # Example
//!
//! ```ignore
//! let config = CoordinatorConfig::new("front_porch").with_update_interval(Duration::from_secs(30));
//! let coordinator = Coordinator::setup(config, client).await?;
//! let id = coordinator.add_listener(|| println!("refreshed"));
//! // ...
//! coordinator.remove_listener(id);
//! coordinator.teardown().await;
//! ```

mod client;
mod coordinator;
mod error;
mod listeners;
mod snapshot;

pub use client::VendorClient;
pub use coordinator::{
    Coordinator, CoordinatorConfig, DEFAULT_UPDATE_INTERVAL, REQUEST_REFRESH_DEFAULT_COOLDOWN,
    UNAVAILABLE_AFTER_FAILURES,
};
pub use error::{SetupError, UpdateError};
pub use listeners::{ListenerId, Listeners, UpdateCallback};
pub use snapshot::Snapshot;
