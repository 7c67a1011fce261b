//! Incremental update events and point-in-time model snapshots.

use serde::{Deserialize, Serialize};

use super::object::TrackedObject;
use super::types::{ObjectId, ObjectState};

/// What happened to an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// First observation created the object.
    Created,
    /// An observation was fused without a state change.
    Fused,
    /// Evidence promoted the object.
    Transitioned { from: ObjectState, to: ObjectState },
    /// A remote peer's copy was applied.
    Merged,
    /// Operator renamed the object.
    Renamed,
    /// Operator forced the state.
    Forced { from: ObjectState, to: ObjectState },
    /// The object left the model (ageing expiry, delete or forced discard).
    Removed,
}

/// Update event: object id plus a copy of the object after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    pub id: ObjectId,
    pub kind: UpdateKind,
    pub object: TrackedObject,
}

impl ObjectUpdate {
    pub fn new(kind: UpdateKind, object: &TrackedObject) -> Self {
        Self {
            id: object.id.clone(),
            kind,
            object: object.clone(),
        }
    }

    /// Event for an object that left the model; its snapshot reads `DISCARDED`.
    pub fn removed(mut object: TrackedObject) -> Self {
        object.state = ObjectState::Discarded;
        Self {
            id: object.id.clone(),
            kind: UpdateKind::Removed,
            object,
        }
    }

    /// Whether subscribers get this event. Every kind except a plain `Fused`
    /// integration is published.
    pub fn is_published(&self) -> bool {
        !matches!(self.kind, UpdateKind::Fused)
    }
}

/// Consistent copy of every object in a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Frame all poses are expressed in.
    pub frame_id: String,

    /// Latest observation timestamp integrated into the model, in nanoseconds.
    pub stamp_ns: u64,

    /// Objects sorted by id.
    pub objects: Vec<TrackedObject>,
}

impl ModelSnapshot {
    pub fn get(&self, id: &ObjectId) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
