//! Percept intake: frames, cameras, verification, and normalization into
//! world-frame observations.

pub mod camera;
pub mod ingestor;
pub mod percept;
pub mod transform;
pub mod verification;

pub use camera::{CameraModel, CameraRegistry, PinholeCamera};
pub use ingestor::PerceptIngestor;
pub use percept::{ImagePercept, PosePercept};
pub use transform::{TransformResolver, TransformTree};
pub use verification::{Verdict, VerificationRegistry, VerificationRequest, VerificationService};
