//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Poses follow the `T_target_source` naming convention: `T_map_camera`
//! maps a point expressed in the camera frame into the map frame.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid body transformation. Transforms points as `p' = R * p + t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from roll/pitch/yaw (radians) and translation.
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    /// Convert to homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Inverse transformation: `[R^T | -R^T t]`.
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: `self ∘ other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Rotate a direction vector (translation is ignored).
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
