//! Request/response operations of the Mutation API.

use crate::model::{ModelSnapshot, ObjectId, ObjectState, Observation};

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    SetObjectState { id: ObjectId, state: ObjectState },
    SetObjectName { id: ObjectId, name: String },
    /// Create an object without gating; `id` and `state` are optional overrides.
    AddObject {
        observation: Observation,
        id: Option<ObjectId>,
        state: Option<ObjectState>,
    },
    GetObjectModel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    Done,
    ObjectAdded(ObjectId),
    Model(ModelSnapshot),
}
