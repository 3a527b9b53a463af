//! Error types for refresh and setup

use thiserror::Error;

/// Why a refresh did not produce data
///
/// Stored inside failed [`Snapshot`](crate::Snapshot)s, so it is `Clone` and
/// carries messages rather than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// The fetch exceeded the coordinator's request timeout
    #[error("timeout fetching data")]
    Timeout,

    /// The vendor endpoint could not be reached
    #[error("error requesting data: {0}")]
    Connection(String),

    /// The vendor answered but the answer is unusable
    #[error("error fetching data: {0}")]
    UpdateFailed(String),

    /// Credentials were rejected; polling stops until a refresh succeeds
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The fetch panicked or its task was aborted
    #[error("unexpected error fetching data: {0}")]
    Unexpected(String),

    /// The coordinator was torn down before the refresh could run
    #[error("coordinator has been shut down")]
    ShutDown,
}

impl UpdateError {
    pub fn update_failed(message: impl Into<String>) -> Self {
        Self::UpdateFailed(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::AuthFailed(message.into())
    }

    /// Whether retrying on the next tick is pointless without new credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

/// Errors returned by [`Coordinator::setup`](crate::Coordinator::setup)
///
/// A failed setup never leaves a timer running; the host should retry the
/// whole setup later (or ask for new credentials on `AuthFailed`).
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    #[error("{name} is not ready: {source}")]
    NotReady {
        name: String,
        #[source]
        source: UpdateError,
    },

    #[error("authentication failed while setting up {name}: {source}")]
    AuthFailed {
        name: String,
        #[source]
        source: UpdateError,
    },

    /// Rejected before any vendor call was made
    #[error("invalid configuration for {name}: {reason}")]
    InvalidConfig { name: String, reason: String },
}

impl SetupError {
    pub(crate) fn from_first_refresh(name: &str, source: UpdateError) -> Self {
        let name = name.to_string();
        if source.is_auth_failure() {
            Self::AuthFailed { name, source }
        } else {
            Self::NotReady { name, source }
        }
    }

    /// The refresh error that caused setup to fail; `None` when setup was
    /// rejected before the first refresh
    pub fn update_error(&self) -> Option<&UpdateError> {
        match self {
            Self::NotReady { source, .. } | Self::AuthFailed { source, .. } => Some(source),
            Self::InvalidConfig { .. } => None,
        }
    }
}
