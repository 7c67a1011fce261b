//! PerceptIngestor - turns raw percepts into world-frame observations.
//!
//! Pose percepts are transformed into the world frame with their covariance
//! rotated accordingly. Image percepts are back-projected into a ray, placed
//! along it (measured distance, ground-plane hit, or default depth), and given
//! a covariance that is tight across the ray and loose along it.
//!
//! Everything here runs outside the model lock.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::{Matrix3, Matrix6, Vector3};
use tracing::{debug, info};

use crate::config::ImagePerceptConfig;
use crate::error::TrackerResult;
use crate::geometry::{PoseWithCovariance, SE3};
use crate::model::Observation;

use super::camera::CameraRegistry;
use super::percept::{ImagePercept, PosePercept};
use super::transform::TransformResolver;
use super::verification::{Verdict, VerificationRegistry, VerificationRequest};

/// Rays closer to horizontal than this never hit the ground plane.
const MIN_GROUND_RAY_Z: f64 = 1e-6;

pub struct PerceptIngestor {
    world_frame: String,
    cameras: CameraRegistry,
    transforms: Arc<dyn TransformResolver>,
    verification: VerificationRegistry,
    image: ImagePerceptConfig,
}

impl PerceptIngestor {
    pub fn new(
        world_frame: impl Into<String>,
        cameras: CameraRegistry,
        transforms: Arc<dyn TransformResolver>,
        verification: VerificationRegistry,
        image: ImagePerceptConfig,
    ) -> Self {
        Self {
            world_frame: world_frame.into(),
            cameras,
            transforms,
            verification,
            image,
        }
    }

    pub fn world_frame(&self) -> &str {
        &self.world_frame
    }

    /// Normalize a pose percept. `Ok(None)` means a verifier discarded it.
    pub fn ingest_pose(&self, percept: &PosePercept) -> TrackerResult<Option<Observation>> {
        let t_world_source = self
            .transforms
            .resolve(&percept.frame_id, &self.world_frame, percept.timestamp_ns)?;
        let pose = percept.pose.transformed(&t_world_source);

        let observation = self.observation(
            &percept.class_id,
            pose,
            percept.timestamp_ns,
            percept.support,
            percept.name.as_deref(),
        );
        Ok(self.verify(observation, &percept.frame_id))
    }

    /// Normalize an image percept. `Ok(None)` means a verifier discarded it.
    pub fn ingest_image(&self, percept: &ImagePercept) -> TrackerResult<Option<Observation>> {
        let camera = self.cameras.get(&percept.sensor_id)?;
        let ray_camera = camera.back_project(percept.image_x, percept.image_y)?;
        let t_world_camera = self
            .transforms
            .resolve(camera.frame_id(), &self.world_frame, percept.timestamp_ns)?;

        let origin = t_world_camera.translation;
        let direction = t_world_camera.transform_vector(&ray_camera);
        let depth = self.depth_along_ray(percept.distance, &origin, &direction);
        let position = origin + direction * depth;

        let covariance = self.ray_covariance(&direction, depth);
        let pose = PoseWithCovariance::new(SE3::from_translation(position), covariance);
        debug!(
            "Image percept {} from '{}' at depth {:.2} → [{:.2}, {:.2}, {:.2}]",
            percept.class_id, percept.sensor_id, depth, position.x, position.y, position.z
        );

        let observation = self.observation(
            &percept.class_id,
            pose,
            percept.timestamp_ns,
            percept.support,
            percept.name.as_deref(),
        );
        Ok(self.verify(observation, &percept.sensor_id))
    }

    fn observation(
        &self,
        class_id: &str,
        pose: PoseWithCovariance,
        timestamp_ns: u64,
        support: Option<f64>,
        name: Option<&str>,
    ) -> Observation {
        let mut observation = Observation::new(class_id, pose, timestamp_ns, self.world_frame.as_str())
            .with_confidence(support.unwrap_or(1.0));
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            observation = observation.with_name(name);
        }
        observation
    }

    /// Depth along a world-frame ray: measured, else ground hit, else default.
    fn depth_along_ray(&self, measured: Option<f64>, origin: &Vector3<f64>, direction: &Vector3<f64>) -> f64 {
        if let Some(distance) = measured.filter(|d| d.is_finite() && *d > 0.0) {
            return distance;
        }
        if self.image.project_on_ground && direction.z < -MIN_GROUND_RAY_Z {
            let depth = (self.image.ground_height - origin.z) / direction.z;
            if depth > 0.0 {
                return depth;
            }
        }
        self.image.default_distance
    }

    /// Covariance with `distance_variance` along the ray and the angular
    /// uncertainty scaled by depth across it. Orientation is unknown.
    fn ray_covariance(&self, direction: &Vector3<f64>, depth: f64) -> Matrix6<f64> {
        let along = direction.normalize();
        let helper = if along.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let across_1 = along.cross(&helper).normalize();
        let across_2 = along.cross(&across_1);
        let basis = Matrix3::from_columns(&[along, across_1, across_2]);

        let lateral = depth * depth * self.image.angle_variance;
        let local = Matrix3::from_diagonal(&Vector3::new(self.image.distance_variance, lateral, lateral));
        let position_cov = basis * local * basis.transpose();

        let mut covariance = Matrix6::zeros();
        covariance.fixed_view_mut::<3, 3>(0, 0).copy_from(&position_cov);
        covariance
            .fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Matrix3::identity() * PI * PI));
        covariance
    }

    fn verify(&self, mut observation: Observation, sensor_id: &str) -> Option<Observation> {
        if self.verification.is_empty() {
            return Some(observation);
        }
        let request = VerificationRequest {
            sensor_id: sensor_id.to_string(),
            observation: observation.clone(),
        };
        match self.verification.verify(&request) {
            Verdict::Discard => {
                info!("Verification discarded {} percept from '{}'", observation.class_id, sensor_id);
                None
            }
            Verdict::Confirm => {
                observation.verified = true;
                observation.confidence = 1.0;
                Some(observation)
            }
            Verdict::Unknown => Some(observation),
        }
    }
}
