//! Geometry utilities: SE3 transforms, poses with covariance, fusion and gating statistics.

pub mod pose;
pub mod se3;

pub use pose::{PoseWithCovariance, euclidean, fuse, mahalanobis_sq, rotate_covariance};
pub use se3::SE3;
