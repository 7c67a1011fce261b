//! Tracker configuration, loaded from YAML.
//!
//! Every field has a default so a partial file (or an empty one) is valid:
//!
//! ```yaml
//! frame_id: map
//! publish_interval_s: 1.0
//! fusion:
//!   gate: { kind: mahalanobis, threshold: 3.0 }
//!   active_threshold: 2.0
//! ageing:
//!   window_s: 1.0
//!   decay_factor: 0.5
//! cameras:
//!   front: { frame_id: front_camera, fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0 }
//! peers:
//!   - prefix: "robot2/"
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Longest accepted publish or ageing period, in seconds (one day).
pub const MAX_INTERVAL_S: f64 = 86_400.0;

/// Top-level tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Fixed world frame all objects are expressed in.
    pub frame_id: String,

    /// Period of the full-model publication, in seconds.
    pub publish_interval_s: f64,

    /// Period of the ageing pass, in seconds.
    pub ageing_interval_s: f64,

    /// Clock the scheduler uses to age objects.
    pub time_source: TimeSource,

    pub fusion: FusionConfig,
    pub ageing: AgeingConfig,
    pub image_percepts: ImagePerceptConfig,
    pub verification: VerificationConfig,

    /// Camera intrinsics keyed by sensor id.
    pub cameras: HashMap<String, CameraConfig>,

    /// Fixed transforms between named frames.
    pub static_transforms: Vec<StaticTransformConfig>,

    /// How far a transform lookup may fall outside the buffered history, in seconds.
    pub transform_tolerance_s: f64,

    /// Remote tracking agents whose models are merged into this one.
    pub peers: Vec<PeerConfig>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_id: "map".to_string(),
            publish_interval_s: 1.0,
            ageing_interval_s: 1.0,
            time_source: TimeSource::Wall,
            fusion: FusionConfig::default(),
            ageing: AgeingConfig::default(),
            image_percepts: ImagePerceptConfig::default(),
            verification: VerificationConfig::default(),
            cameras: HashMap::new(),
            static_transforms: Vec::new(),
            transform_tolerance_s: 0.1,
            peers: Vec::new(),
        }
    }
}

impl TrackerConfig {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse and validate a configuration from a YAML string.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_id.is_empty() {
            bail!("frame_id must not be empty");
        }
        for (name, value) in [
            ("publish_interval_s", self.publish_interval_s),
            ("ageing_interval_s", self.ageing_interval_s),
        ] {
            if !(value.is_finite() && value > 0.0 && value <= MAX_INTERVAL_S) {
                bail!("{} must be in (0, {}], got {}", name, MAX_INTERVAL_S, value);
            }
        }
        if self.fusion.confirmed_threshold < self.fusion.active_threshold {
            bail!(
                "confirmed_threshold ({}) must not be below active_threshold ({})",
                self.fusion.confirmed_threshold,
                self.fusion.active_threshold
            );
        }
        if !(self.fusion.gate.threshold.is_finite() && self.fusion.gate.threshold > 0.0) {
            bail!("fusion.gate.threshold must be positive");
        }
        if !(self.ageing.window_s.is_finite() && self.ageing.window_ns() > 0) {
            bail!("ageing.window_s must be at least one nanosecond, got {}", self.ageing.window_s);
        }
        if !(self.ageing.decay_factor.is_finite() && self.ageing.decay_factor >= 0.0) {
            bail!("ageing.decay_factor must not be negative");
        }
        if !(self.transform_tolerance_s.is_finite() && self.transform_tolerance_s >= 0.0) {
            bail!("transform_tolerance_s must not be negative");
        }
        for peer in &self.peers {
            if peer.prefix.is_empty() {
                bail!("peer prefix must not be empty");
            }
        }
        Ok(())
    }

    pub fn transform_tolerance_ns(&self) -> u64 {
        (self.transform_tolerance_s * 1e9) as u64
    }

    /// The subset of the configuration the object model needs.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            frame_id: self.frame_id.clone(),
            fusion: self.fusion.clone(),
            ageing: self.ageing.clone(),
        }
    }
}

/// Which clock drives ageing passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// System wall clock.
    Wall,
    /// Latest percept timestamp seen by the model (for log replay).
    Percept,
}

/// Spatial gate kind used to match observations to objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Mahalanobis,
    Euclidean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub kind: GateKind,
    /// Maximum distance (metres for Euclidean, standard deviations for Mahalanobis).
    pub threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            kind: GateKind::Mahalanobis,
            threshold: 3.0,
        }
    }
}

/// Matching, fusion and state-promotion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub gate: GateConfig,
    /// Support given to a newly created object.
    pub initial_support: f64,
    /// Support added per corroborating observation (scaled by its confidence).
    pub support_increment: f64,
    /// `PENDING → ACTIVE` once support reaches this.
    pub active_threshold: f64,
    /// `ACTIVE → CONFIRMED` once support reaches this.
    pub confirmed_threshold: f64,
    /// Variance floor used when a covariance is singular.
    pub min_covariance: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            initial_support: 1.0,
            support_increment: 1.0,
            active_threshold: 2.0,
            confirmed_threshold: 5.0,
            min_covariance: 1e-6,
        }
    }
}

/// Support decay for objects that stop being observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeingConfig {
    /// Objects observed within this window are left alone, in seconds.
    pub window_s: f64,
    /// Fraction of the last observed support lost per idle window.
    pub decay_factor: f64,
    /// Objects whose support falls to or below this are discarded.
    pub discard_threshold: f64,
}

impl Default for AgeingConfig {
    fn default() -> Self {
        Self {
            window_s: 1.0,
            decay_factor: 0.5,
            discard_threshold: 0.0,
        }
    }
}

impl AgeingConfig {
    pub fn window_ns(&self) -> u64 {
        (self.window_s * 1e9) as u64
    }
}

/// How 2D image detections are lifted into 3D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagePerceptConfig {
    /// Depth along the ray when neither a distance nor a ground hit is available, in metres.
    pub default_distance: f64,
    /// Variance along the viewing ray, in m².
    pub distance_variance: f64,
    /// Angular variance of the detection, in rad².
    pub angle_variance: f64,
    /// Intersect rays with a horizontal ground plane when they point down.
    pub project_on_ground: bool,
    /// Height of the ground plane in the world frame, in metres.
    pub ground_height: f64,
}

impl Default for ImagePerceptConfig {
    fn default() -> Self {
        Self {
            default_distance: 1.0,
            distance_variance: 1.0,
            angle_variance: (10.0_f64.to_radians()).powi(2),
            project_on_ground: false,
            ground_height: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Upper bound for one verification-service call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { timeout_ms: 200 }
    }
}

/// Pinhole intrinsics for one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub frame_id: String,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// `T_parent_child` expressed as translation + roll/pitch/yaw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransformConfig {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default)]
    pub rotation_rpy: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Namespace prepended to every object id received from this peer.
    pub prefix: String,
}

/// Parameters owned by an `ObjectModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub frame_id: String,
    pub fusion: FusionConfig,
    pub ageing: AgeingConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        TrackerConfig::default().model_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TrackerConfig::from_yaml_str("").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.frame_id, "map");
        assert_eq!(config.fusion.gate.kind, GateKind::Mahalanobis);
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
frame_id: world
time_source: percept
fusion:
  gate: { kind: euclidean, threshold: 0.5 }
  active_threshold: 3.0
ageing:
  decay_factor: 0.25
cameras:
  front:
    frame_id: front_camera
    fx: 500.0
    fy: 500.0
    cx: 320.0
    cy: 240.0
static_transforms:
  - parent: map
    child: base_link
    translation: [1.0, 0.0, 0.0]
peers:
  - prefix: "robot2/"
"#;
        let config = TrackerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.frame_id, "world");
        assert_eq!(config.time_source, TimeSource::Percept);
        assert_eq!(config.fusion.gate.kind, GateKind::Euclidean);
        assert_eq!(config.fusion.active_threshold, 3.0);
        assert_eq!(config.fusion.confirmed_threshold, 5.0);
        assert_eq!(config.ageing.decay_factor, 0.25);
        assert_eq!(config.ageing.window_s, 1.0);
        assert_eq!(config.cameras["front"].frame_id, "front_camera");
        assert_eq!(config.static_transforms[0].rotation_rpy, [0.0, 0.0, 0.0]);
        assert_eq!(config.peers[0].prefix, "robot2/");
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let yaml = "fusion:\n  active_threshold: 5.0\n  confirmed_threshold: 2.0\n";
        assert!(TrackerConfig::from_yaml_str(yaml).is_err());

        let yaml = "peers:\n  - prefix: \"\"\n";
        assert!(TrackerConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_non_finite_periods_rejected() {
        for value in [f64::NAN, f64::INFINITY, 1e30, 0.0, -1.0] {
            let config = TrackerConfig {
                publish_interval_s: value,
                ..TrackerConfig::default()
            };
            assert!(config.validate().is_err(), "publish_interval_s {}", value);

            let config = TrackerConfig {
                ageing_interval_s: value,
                ..TrackerConfig::default()
            };
            assert!(config.validate().is_err(), "ageing_interval_s {}", value);
        }

        let mut config = TrackerConfig::default();
        config.ageing.window_s = 1e-12;
        assert!(config.validate().is_err());
        config.ageing.window_s = f64::NAN;
        assert!(config.validate().is_err());
        config.ageing.window_s = 1e-6;
        assert!(config.validate().is_ok());

        assert!(TrackerConfig::from_yaml_str("publish_interval_s: .nan\n").is_err());
        assert!(TrackerConfig::from_yaml_str("ageing_interval_s: 86400.0\n").is_ok());
    }

    #[test]
    fn test_window_ns() {
        let ageing = AgeingConfig {
            window_s: 1.5,
            ..AgeingConfig::default()
        };
        assert_eq!(ageing.window_ns(), 1_500_000_000);
    }
}
