//! Entity definitions: identifiers, delivery obligations, and standing obligations.

mod obligation;
mod standing;

pub use obligation::*;
pub use standing::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a non-player character that sends or receives obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpcId(pub Uuid);

impl NpcId {
    /// Create a new random NPC ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an NPC ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create a nil NPC ID (useful for defaults).
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for NpcId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for delivery obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObligationId(pub Uuid);

impl ObligationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ObligationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObligationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for standing obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StandingObligationId(pub Uuid);

impl StandingObligationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StandingObligationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StandingObligationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
