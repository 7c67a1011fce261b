//! Canonical observation: what the model integrates, whatever the percept source.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::PoseWithCovariance;

/// A single percept normalized into the tracker's world frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Semantic label, may be empty.
    pub class_id: String,

    /// Pose and covariance in `frame_id`.
    pub pose: PoseWithCovariance,

    /// Sensor timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Frame the pose is expressed in (the tracker's world frame after ingestion).
    pub frame_id: String,

    /// Detection confidence in `[0, 1]`; scales the support increment.
    pub confidence: f64,

    /// Set when a verification service confirmed the detection.
    pub verified: bool,

    /// Name applied if this observation creates an object.
    pub name: Option<String>,
}

impl Observation {
    pub fn new(
        class_id: impl Into<String>,
        pose: PoseWithCovariance,
        timestamp_ns: u64,
        frame_id: impl Into<String>,
    ) -> Self {
        Self {
            class_id: class_id.into(),
            pose,
            timestamp_ns,
            frame_id: frame_id.into(),
            confidence: 1.0,
            verified: false,
            name: None,
        }
    }

    /// Observation at a position with isotropic variance, in the `map` frame.
    pub fn at_position(
        class_id: impl Into<String>,
        position: Vector3<f64>,
        variance: f64,
        timestamp_ns: u64,
    ) -> Self {
        Self::new(
            class_id,
            PoseWithCovariance::from_position(position, variance),
            timestamp_ns,
            "map",
        )
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
