//! Context attached to every state write

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies the refresh that caused a state write
///
/// Coordinator-driven writes get a fresh context per published change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier (ULID)
    pub id: String,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_ids_are_unique_ulids() {
        let a = Context::new();
        let b = Context::default();
        assert_ne!(a.id, b.id);
        assert!(a.id.parse::<Ulid>().is_ok());
    }
}
