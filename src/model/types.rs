//! Core identity and state types for tracked objects.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Unique identifier for a TrackedObject within an ObjectModel.
///
/// Local ids look like `victim_3`; merged ids carry the peer namespace in
/// front (`robot2/victim_3`). Ids are never reassigned once handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Namespace this id under a peer prefix.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self(format!("{}{}", prefix, self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// Confidence state of a tracked object.
///
/// Evidence only moves an object forward along
/// `Pending → Active → Confirmed`. `Discarded` is terminal: the object is
/// removed from the model. `Inactive` is only reachable by operator override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectState {
    #[default]
    Pending,
    Active,
    Confirmed,
    Discarded,
    Inactive,
}

impl ObjectState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Discarded => "DISCARDED",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for ObjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ObjectState {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DISCARDED" => Ok(Self::Discarded),
            "INACTIVE" => Ok(Self::Inactive),
            _ => Err(TrackerError::InvalidState(s.to_string())),
        }
    }
}
