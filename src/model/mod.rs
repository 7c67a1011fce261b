//! Object model: tracked objects, their state machine, and peer merging.

pub mod events;
pub mod merge;
pub mod object;
pub mod object_model;
pub mod observation;
pub mod types;

pub use events::{ModelSnapshot, ObjectUpdate, UpdateKind};
pub use merge::ModelMerger;
pub use object::TrackedObject;
pub use object_model::ObjectModel;
pub use observation::Observation;
pub use types::{ObjectId, ObjectState};
