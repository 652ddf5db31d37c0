//! Run identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one saga run, assigned when the context is built.
///
/// Kept as a newtype so a run ID cannot be confused with the domain
/// identifiers flowing through a saga's state (mission, user or guild IDs
/// are UUIDs too). Serializes transparently as the bare UUID, which is what
/// audit records and lifecycle events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Generates a fresh random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID, e.g. for correlation with external
    /// audit storage.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
