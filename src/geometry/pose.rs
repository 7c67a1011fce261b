//! Poses with 6x6 covariance and the statistics used for fusion and gating.
//!
//! Covariance layout follows the usual `[x y z | rx ry rz]` convention: the
//! top-left 3x3 block is the position covariance, the bottom-right block the
//! orientation covariance (rotation vector, radians²).

use nalgebra::{Matrix3, Matrix6, Vector3};
use serde::{Deserialize, Serialize};

use super::SE3;

/// A pose in a fixed frame together with its uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: SE3,
    pub covariance: Matrix6<f64>,
}

impl PoseWithCovariance {
    pub fn new(pose: SE3, covariance: Matrix6<f64>) -> Self {
        Self { pose, covariance }
    }

    /// Position-only pose with isotropic position variance.
    ///
    /// The orientation block is set to the same variance so a later fusion
    /// does not over-trust the identity orientation.
    pub fn from_position(position: Vector3<f64>, variance: f64) -> Self {
        Self {
            pose: SE3::from_translation(position),
            covariance: Matrix6::identity() * variance,
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        self.pose.translation
    }

    pub fn position_covariance(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn orientation_covariance(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(3, 3).into_owned()
    }

    /// Express this pose in another frame: `transform` is `T_target_source`.
    ///
    /// The covariance is rotated by the transform's rotation; the translation
    /// part does not scale it.
    pub fn transformed(&self, transform: &SE3) -> Self {
        Self {
            pose: transform.compose(&self.pose),
            covariance: rotate_covariance(&self.covariance, &transform.rotation_matrix()),
        }
    }
}

/// Rotate a 6x6 pose covariance: `C' = J C J^T` with `J = diag(R, R)`.
pub fn rotate_covariance(covariance: &Matrix6<f64>, rotation: &Matrix3<f64>) -> Matrix6<f64> {
    let mut j = Matrix6::zeros();
    j.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    j.fixed_view_mut::<3, 3>(3, 3).copy_from(rotation);
    j * covariance * j.transpose()
}

/// Invert a covariance block, adding `min_variance` to the diagonal if it is singular.
fn information(cov: &Matrix3<f64>, min_variance: f64) -> Matrix3<f64> {
    cov.try_inverse()
        .or_else(|| (cov + Matrix3::identity() * min_variance).try_inverse())
        .unwrap_or_else(|| Matrix3::identity() / min_variance)
}

/// Fuse two estimates of the same pose by inverse-covariance weighting.
///
/// Positions are combined in information form. Orientations are slerped with
/// a weight derived from the traces of the orientation blocks, and the
/// orientation covariance is fused the same way as the position one. Cross
/// terms between position and orientation are dropped.
pub fn fuse(
    prior: &PoseWithCovariance,
    measurement: &PoseWithCovariance,
    min_variance: f64,
) -> PoseWithCovariance {
    let info_a = information(&prior.position_covariance(), min_variance);
    let info_b = information(&measurement.position_covariance(), min_variance);
    let pos_cov = information(&(info_a + info_b), min_variance);
    let position = pos_cov * (info_a * prior.position() + info_b * measurement.position());

    let rot_a = prior.orientation_covariance();
    let rot_b = measurement.orientation_covariance();
    let trace_sum = rot_a.trace() + rot_b.trace();
    let weight = if trace_sum > 0.0 {
        rot_a.trace() / trace_sum
    } else {
        0.5
    };
    let rotation = prior
        .pose
        .rotation
        .try_slerp(&measurement.pose.rotation, weight, 1e-9)
        .unwrap_or(prior.pose.rotation);
    let rot_cov = information(
        &(information(&rot_a, min_variance) + information(&rot_b, min_variance)),
        min_variance,
    );

    let mut covariance = Matrix6::zeros();
    covariance.fixed_view_mut::<3, 3>(0, 0).copy_from(&pos_cov);
    covariance.fixed_view_mut::<3, 3>(3, 3).copy_from(&rot_cov);

    PoseWithCovariance {
        pose: SE3 {
            rotation,
            translation: position,
        },
        covariance,
    }
}

/// Squared Mahalanobis distance between two positions using their combined covariance.
///
/// Returns `f64::MAX` if the combined covariance is singular.
pub fn mahalanobis_sq(a: &PoseWithCovariance, b: &PoseWithCovariance) -> f64 {
    let residual = a.position() - b.position();
    let s = a.position_covariance() + b.position_covariance();
    match s.try_inverse() {
        Some(s_inv) => (residual.transpose() * s_inv * residual)[(0, 0)],
        None => f64::MAX,
    }
}

/// Euclidean distance between the two positions.
pub fn euclidean(a: &PoseWithCovariance, b: &PoseWithCovariance) -> f64 {
    (a.position() - b.position()).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_fuse_equal_weights_averages() {
        let a = PoseWithCovariance::from_position(Vector3::new(0.0, 0.0, 0.0), 1.0);
        let b = PoseWithCovariance::from_position(Vector3::new(2.0, 4.0, 0.0), 1.0);

        let fused = fuse(&a, &b, 1e-6);
        assert_relative_eq!(fused.position(), Vector3::new(1.0, 2.0, 0.0), epsilon = 1e-10);
        // Two independent unit-variance estimates halve the variance.
        assert_relative_eq!(
            fused.position_covariance(),
            Matrix3::identity() * 0.5,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_fuse_prefers_certain_estimate() {
        let certain = PoseWithCovariance::from_position(Vector3::new(0.0, 0.0, 0.0), 0.01);
        let vague = PoseWithCovariance::from_position(Vector3::new(10.0, 0.0, 0.0), 100.0);

        let fused = fuse(&certain, &vague, 1e-6);
        assert!(fused.position().x < 0.01);
        assert!(fused.position_covariance()[(0, 0)] < 0.01);
    }

    #[test]
    fn test_fuse_singular_covariance_is_regularized() {
        let a = PoseWithCovariance::new(SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)), Matrix6::zeros());
        let b = PoseWithCovariance::from_position(Vector3::new(3.0, 0.0, 0.0), 1.0);

        let fused = fuse(&a, &b, 1e-3);
        assert!(fused.position().x.is_finite());
        assert!(fused.position().x >= 1.0 && fused.position().x < 1.01);
    }

    #[test]
    fn test_rotate_covariance() {
        // Variance only along x; yaw by 90° moves it onto y.
        let mut cov = Matrix6::zeros();
        cov[(0, 0)] = 4.0;
        cov[(3, 3)] = 1.0;
        let t = SE3::from_rpy(0.0, 0.0, FRAC_PI_2, Vector3::new(5.0, 5.0, 5.0));

        let rotated = rotate_covariance(&cov, &t.rotation_matrix());
        assert_relative_eq!(rotated[(0, 0)], 0.0, epsilon = 1e-10);
        assert_relative_eq!(rotated[(1, 1)], 4.0, epsilon = 1e-10);
        assert_relative_eq!(rotated[(4, 4)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_transformed_ignores_translation_for_covariance() {
        let p = PoseWithCovariance::from_position(Vector3::new(1.0, 0.0, 0.0), 2.0);
        let t = SE3::from_translation(Vector3::new(10.0, 0.0, 0.0));

        let moved = p.transformed(&t);
        assert_relative_eq!(moved.position(), Vector3::new(11.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(moved.covariance, p.covariance, epsilon = 1e-12);
    }

    #[test]
    fn test_distances() {
        let a = PoseWithCovariance::from_position(Vector3::new(0.0, 0.0, 0.0), 1.0);
        let b = PoseWithCovariance::from_position(Vector3::new(3.0, 4.0, 0.0), 1.0);

        assert_relative_eq!(euclidean(&a, &b), 5.0, epsilon = 1e-12);
        // Combined covariance is 2I, so d² = 25 / 2.
        assert_relative_eq!(mahalanobis_sq(&a, &b), 12.5, epsilon = 1e-10);
    }
}
