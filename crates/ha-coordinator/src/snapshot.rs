//! Snapshot: the immutable outcome of one refresh

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::UpdateError;

/// Result of a single refresh cycle
///
/// A snapshot either carries a payload or an error, never both, and is
/// never modified once built. The coordinator swaps whole snapshots, so a
/// reader can never pair the payload of one fetch with the timestamp or
/// error of another.
#[derive(Debug)]
pub struct Snapshot<T> {
    timestamp: DateTime<Utc>,
    payload: Option<T>,
    error: Option<UpdateError>,
    consecutive_failures: u32,
    fetch_duration: Duration,
}

impl<T> Snapshot<T> {
    pub fn success(payload: T, fetch_duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            payload: Some(payload),
            error: None,
            consecutive_failures: 0,
            fetch_duration,
        }
    }

    /// A failed refresh; `consecutive_failures` counts this one
    pub fn failure(error: UpdateError, consecutive_failures: u32, fetch_duration: Duration) -> Self {
        Self {
            timestamp: Utc::now(),
            payload: None,
            error: Some(error),
            consecutive_failures,
            fetch_duration,
        }
    }

    /// When the refresh completed
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&UpdateError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Failures in a row up to and including this snapshot (0 on success)
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// How long the vendor call took
    pub fn fetch_duration(&self) -> Duration {
        self.fetch_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_payload_only() {
        let snapshot = Snapshot::success(42, Duration::from_millis(5));
        assert_eq!(snapshot.payload(), Some(&42));
        assert!(snapshot.error().is_none());
        assert!(snapshot.is_success());
        assert_eq!(snapshot.consecutive_failures(), 0);
    }

    #[test]
    fn test_failure_has_error_only() {
        let snapshot: Snapshot<u32> = Snapshot::failure(UpdateError::Timeout, 2, Duration::ZERO);
        assert!(snapshot.payload().is_none());
        assert_eq!(snapshot.error(), Some(&UpdateError::Timeout));
        assert!(!snapshot.is_success());
        assert_eq!(snapshot.consecutive_failures(), 2);
    }
}
