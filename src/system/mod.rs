//! Tracker orchestration and thread management.
//!
//! This module contains the top-level `ObjectTracker` that owns the shared
//! state, exposes the event sources and the Mutation API, and spawns the
//! scheduler thread. `replay` drives a tracker from a recorded log instead.

pub mod messages;
pub mod replay;
pub mod scheduler;
pub mod services;
pub mod shared_state;
mod object_tracker;

pub use messages::{Publication, Publisher};
pub use replay::{ReplayStats, replay_log};
pub use object_tracker::{ObjectTracker, ObjectTrackerBuilder};
pub use scheduler::Scheduler;
pub use services::{ServiceRequest, ServiceResponse};
pub use shared_state::SharedState;
