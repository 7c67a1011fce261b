//! Camera models used to lift 2D detections into viewing rays.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::Vector3;

use crate::config::CameraConfig;
use crate::error::{TrackerError, TrackerResult};

/// Back-projects image points of one sensor into rays in its optical frame.
pub trait CameraModel: Send + Sync {
    /// Frame the rays are expressed in.
    fn frame_id(&self) -> &str;

    /// Unit viewing ray through pixel `(x, y)`.
    fn back_project(&self, x: f64, y: f64) -> TrackerResult<Vector3<f64>>;
}

/// Ideal pinhole camera (no distortion), optical frame z-forward.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera {
    pub frame_id: String,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeCamera {
    pub fn new(frame_id: impl Into<String>, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            frame_id: frame_id.into(),
            fx,
            fy,
            cx,
            cy,
        }
    }
}

impl From<&CameraConfig> for PinholeCamera {
    fn from(config: &CameraConfig) -> Self {
        Self::new(config.frame_id.clone(), config.fx, config.fy, config.cx, config.cy)
    }
}

impl CameraModel for PinholeCamera {
    fn frame_id(&self) -> &str {
        &self.frame_id
    }

    fn back_project(&self, x: f64, y: f64) -> TrackerResult<Vector3<f64>> {
        if !(self.fx > 0.0 && self.fy > 0.0) {
            return Err(TrackerError::ProjectionFailed(format!(
                "camera '{}' has invalid focal length ({}, {})",
                self.frame_id, self.fx, self.fy
            )));
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(TrackerError::ProjectionFailed(format!(
                "non-finite image point ({}, {})",
                x, y
            )));
        }
        let ray = Vector3::new((x - self.cx) / self.fx, (y - self.cy) / self.fy, 1.0);
        Ok(ray.normalize())
    }
}

/// Camera models keyed by sensor id. Built once at startup.
#[derive(Clone, Default)]
pub struct CameraRegistry {
    cameras: HashMap<String, Arc<dyn CameraModel>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cameras: &HashMap<String, CameraConfig>) -> Self {
        let mut registry = Self::new();
        for (sensor_id, config) in cameras {
            registry.insert(sensor_id, Arc::new(PinholeCamera::from(config)));
        }
        registry
    }

    pub fn insert(&mut self, sensor_id: &str, camera: Arc<dyn CameraModel>) {
        self.cameras.insert(sensor_id.to_string(), camera);
    }

    pub fn get(&self, sensor_id: &str) -> TrackerResult<&Arc<dyn CameraModel>> {
        self.cameras
            .get(sensor_id)
            .ok_or_else(|| TrackerError::UnknownSensor(sensor_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_camera() -> PinholeCamera {
        PinholeCamera::new("camera", 500.0, 500.0, 320.0, 240.0)
    }

    #[test]
    fn test_principal_point_is_optical_axis() {
        let ray = create_test_camera().back_project(320.0, 240.0).unwrap();
        assert_relative_eq!(ray, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_ray_is_unit_length() {
        let ray = create_test_camera().back_project(820.0, 240.0).unwrap();
        assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-12);
        // 500 px right of centre with fx = 500 → 45° off axis.
        assert_relative_eq!(ray.x, ray.z, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_intrinsics_fail() {
        let camera = PinholeCamera::new("camera", 0.0, 500.0, 0.0, 0.0);
        assert!(matches!(camera.back_project(1.0, 1.0), Err(TrackerError::ProjectionFailed(_))));
        assert!(create_test_camera().back_project(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_registry_unknown_sensor() {
        let mut cameras = HashMap::new();
        cameras.insert(
            "front".to_string(),
            CameraConfig {
                frame_id: "front_camera".to_string(),
                fx: 500.0,
                fy: 500.0,
                cx: 320.0,
                cy: 240.0,
            },
        );
        let registry = CameraRegistry::from_config(&cameras);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("front").unwrap().frame_id(), "front_camera");
        assert_eq!(
            registry.get("rear").err(),
            Some(TrackerError::UnknownSensor("rear".to_string()))
        );
    }
}
