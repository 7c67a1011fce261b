pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod model;
pub mod perception;
pub mod query;
pub mod system;

pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use system::ObjectTracker;
