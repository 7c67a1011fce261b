//! Error taxonomy for the object tracker.
//!
//! Ingestion-path errors (`TransformUnavailable`, `UnknownSensor`,
//! `ProjectionFailed`) drop the offending percept and are only logged.
//! Mutation-API errors (`ObjectNotFound`, `InvalidState`) are returned to the
//! caller with no model change. `ModelCorruption` drops the affected entry
//! while the rest of the model keeps going.

use crate::model::ObjectId;

/// Result alias used throughout the library.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// The transform provider could not relate the two frames at that time.
    #[error("transform from '{source_frame}' to '{target_frame}' unavailable at t={timestamp_ns}ns")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        timestamp_ns: u64,
    },

    /// No camera model is registered for this sensor id.
    #[error("unknown sensor '{0}'")]
    UnknownSensor(String),

    /// The camera model could not back-project the image point.
    #[error("back-projection failed: {0}")]
    ProjectionFailed(String),

    /// The requested object id is not in the model.
    #[error("object '{0}' not found")]
    ObjectNotFound(ObjectId),

    /// A model invariant was violated (e.g. duplicate id).
    #[error("model corruption: {0}")]
    ModelCorruption(String),

    /// A state name in a request could not be parsed.
    #[error("invalid object state '{0}'")]
    InvalidState(String),

    /// A verification service failed or timed out.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl TrackerError {
    /// True for errors that only affect one percept and should not be retried.
    pub fn is_percept_drop(&self) -> bool {
        matches!(
            self,
            Self::TransformUnavailable { .. } | Self::UnknownSensor(_) | Self::ProjectionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackerError::TransformUnavailable {
            source_frame: "camera".to_string(),
            target_frame: "map".to_string(),
            timestamp_ns: 42,
        };
        assert_eq!(
            err.to_string(),
            "transform from 'camera' to 'map' unavailable at t=42ns"
        );

        let err = TrackerError::ObjectNotFound(ObjectId::from("victim_3"));
        assert_eq!(err.to_string(), "object 'victim_3' not found");
    }

    #[test]
    fn test_percept_drop_classification() {
        assert!(TrackerError::UnknownSensor("cam".into()).is_percept_drop());
        assert!(!TrackerError::ModelCorruption("dup".into()).is_percept_drop());
        assert!(!TrackerError::ObjectNotFound(ObjectId::from("x")).is_percept_drop());
    }
}
