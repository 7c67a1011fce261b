//! Raw percept messages as they arrive from detectors.

use serde::{Deserialize, Serialize};

use crate::geometry::PoseWithCovariance;

/// A 2D detection in a camera image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePercept {
    pub sensor_id: String,
    pub image_x: f64,
    pub image_y: f64,
    /// Measured range along the ray, if the detector has one.
    pub distance: Option<f64>,
    pub class_id: String,
    /// Detection confidence in `[0, 1]`; `None` means 1.
    pub support: Option<f64>,
    pub name: Option<String>,
    pub timestamp_ns: u64,
}

impl ImagePercept {
    pub fn new(sensor_id: impl Into<String>, image_x: f64, image_y: f64, class_id: impl Into<String>, timestamp_ns: u64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            image_x,
            image_y,
            distance: None,
            class_id: class_id.into(),
            support: None,
            name: None,
            timestamp_ns,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }
}

/// A 3D detection with covariance in some source frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosePercept {
    pub frame_id: String,
    pub pose: PoseWithCovariance,
    pub class_id: String,
    pub support: Option<f64>,
    pub name: Option<String>,
    pub timestamp_ns: u64,
}

impl PosePercept {
    pub fn new(frame_id: impl Into<String>, pose: PoseWithCovariance, class_id: impl Into<String>, timestamp_ns: u64) -> Self {
        Self {
            frame_id: frame_id.into(),
            pose,
            class_id: class_id.into(),
            support: None,
            name: None,
            timestamp_ns,
        }
    }

    pub fn with_support(mut self, support: f64) -> Self {
        self.support = Some(support);
        self
    }
}
