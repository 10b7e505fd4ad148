//! Operation identifiers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier scoping at-most-one-concurrent-operation enforcement.
///
/// Callers choose the key (a device id, file path, request id) and the
/// registry guarantees at most one live operation per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey(String);

impl OperationKey {
    /// Create a new operation key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the underlying key string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OperationKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OperationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one operation instance.
///
/// Distinct from [`OperationKey`]: a key can be reused after an operation
/// completes, while the instance id never repeats. The registry matches
/// on it so a stale task can never evict a re-registered key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new random operation id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
