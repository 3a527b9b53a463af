//! The vendor client seam

use async_trait::async_trait;

use crate::UpdateError;

/// An external device or cloud API that a coordinator polls
///
/// Implementations own their transport. Rate limiting, retries inside a
/// single fetch and blocking-to-async bridging (for example with
/// `tokio::task::spawn_blocking`) are the client's concern.
#[async_trait]
pub trait VendorClient: Send + Sync + 'static {
    /// The snapshot payload a successful fetch yields
    type Data: Send + Sync + 'static;

    /// Fetch the current state of the device
    async fn fetch_state(&self) -> Result<Self::Data, UpdateError>;

    /// Release the client's resources; called once at teardown or after a
    /// failed setup
    async fn close(&self) {}
}
