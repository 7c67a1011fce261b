//! Frame transforms: the resolver interface and an in-process transform tree.
//!
//! Each frame has at most one parent. An edge stores `T_parent_child`, either
//! static or as a time-stamped history. Resolving `source → target` walks both
//! frames up to their common ancestor and composes the edges, interpolating
//! dynamic edges at the requested timestamp (lerp for translation, slerp for
//! rotation).

use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use tracing::debug;

use crate::config::StaticTransformConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::geometry::SE3;

/// Resolves rigid transforms between named frames at a point in time.
pub trait TransformResolver: Send + Sync {
    /// `T_target_source`: maps points expressed in `source` into `target`.
    fn resolve(&self, source: &str, target: &str, timestamp_ns: u64) -> TrackerResult<SE3>;
}

/// Samples kept per dynamic edge.
const HISTORY_CAPACITY: usize = 256;

enum Edge {
    Static(SE3),
    /// Samples sorted by timestamp.
    Dynamic(VecDeque<(u64, SE3)>),
}

struct FrameNode {
    parent: String,
    edge: Edge,
}

/// Tree of static and time-varying transforms.
pub struct TransformTree {
    /// Keyed by child frame.
    frames: RwLock<HashMap<String, FrameNode>>,

    /// How far a lookup may fall outside a dynamic edge's history.
    tolerance_ns: u64,
}

impl TransformTree {
    pub fn new(tolerance_ns: u64) -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
            tolerance_ns,
        }
    }

    /// Build from the configured static transforms.
    pub fn from_config(transforms: &[StaticTransformConfig], tolerance_ns: u64) -> Self {
        let tree = Self::new(tolerance_ns);
        for tf in transforms {
            let [x, y, z] = tf.translation;
            let [roll, pitch, yaw] = tf.rotation_rpy;
            tree.set_static(
                &tf.parent,
                &tf.child,
                SE3::from_rpy(roll, pitch, yaw, nalgebra::Vector3::new(x, y, z)),
            );
        }
        tree
    }

    /// Set a fixed `T_parent_child`, replacing any previous edge of `child`.
    pub fn set_static(&self, parent: &str, child: &str, transform: SE3) {
        self.frames.write().insert(
            child.to_string(),
            FrameNode {
                parent: parent.to_string(),
                edge: Edge::Static(transform),
            },
        );
    }

    /// Record `T_parent_child` at `timestamp_ns`.
    ///
    /// Switching parents or replacing a static edge drops the old history.
    pub fn update(&self, parent: &str, child: &str, timestamp_ns: u64, transform: SE3) {
        let mut frames = self.frames.write();
        let node = frames.entry(child.to_string()).or_insert_with(|| FrameNode {
            parent: parent.to_string(),
            edge: Edge::Dynamic(VecDeque::new()),
        });
        if node.parent != parent || matches!(node.edge, Edge::Static(_)) {
            debug!("Re-parenting frame '{}' under '{}'", child, parent);
            node.parent = parent.to_string();
            node.edge = Edge::Dynamic(VecDeque::new());
        }
        if let Edge::Dynamic(history) = &mut node.edge {
            let idx = history.partition_point(|(t, _)| *t <= timestamp_ns);
            if idx > 0 && history[idx - 1].0 == timestamp_ns {
                history[idx - 1].1 = transform;
            } else {
                history.insert(idx, (timestamp_ns, transform));
            }
            while history.len() > HISTORY_CAPACITY {
                history.pop_front();
            }
        }
    }

    pub fn has_frame(&self, frame: &str) -> bool {
        let frames = self.frames.read();
        frames.contains_key(frame) || frames.values().any(|n| n.parent == frame)
    }

    /// Frames from `frame` up to its root, inclusive.
    fn path_to_root(frames: &HashMap<String, FrameNode>, frame: &str) -> Vec<String> {
        let mut path = vec![frame.to_string()];
        let mut current = frame;
        while let Some(node) = frames.get(current) {
            // A cycle would otherwise loop forever.
            if path.iter().any(|f| f == &node.parent) {
                break;
            }
            path.push(node.parent.clone());
            current = &node.parent;
        }
        path
    }

    /// `T_parent_child` for one edge at `timestamp_ns`.
    fn edge_at(&self, node: &FrameNode, timestamp_ns: u64) -> Option<SE3> {
        match &node.edge {
            Edge::Static(transform) => Some(transform.clone()),
            Edge::Dynamic(history) => {
                let (first_t, _) = history.front()?;
                let (last_t, last) = history.back()?;
                if timestamp_ns.saturating_add(self.tolerance_ns) < *first_t
                    || timestamp_ns > last_t.saturating_add(self.tolerance_ns)
                {
                    return None;
                }
                let idx = history.partition_point(|(t, _)| *t <= timestamp_ns);
                if idx == 0 {
                    return history.front().map(|(_, tf)| tf.clone());
                }
                if idx == history.len() {
                    return Some(last.clone());
                }
                let (t0, a) = &history[idx - 1];
                let (t1, b) = &history[idx];
                let alpha = (timestamp_ns - t0) as f64 / (t1 - t0) as f64;
                Some(interpolate(a, b, alpha))
            }
        }
    }

    /// `T_ancestor_frame` for the frames listed in `path` (frame first).
    fn compose_up(
        &self,
        frames: &HashMap<String, FrameNode>,
        path: &[String],
        timestamp_ns: u64,
    ) -> Option<SE3> {
        let mut result = SE3::identity();
        for frame in path {
            let node = frames.get(frame)?;
            result = self.edge_at(node, timestamp_ns)?.compose(&result);
        }
        Some(result)
    }
}

impl Default for TransformTree {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TransformResolver for TransformTree {
    fn resolve(&self, source: &str, target: &str, timestamp_ns: u64) -> TrackerResult<SE3> {
        if source == target {
            return Ok(SE3::identity());
        }
        let unavailable = || TrackerError::TransformUnavailable {
            source_frame: source.to_string(),
            target_frame: target.to_string(),
            timestamp_ns,
        };

        let frames = self.frames.read();
        let source_path = Self::path_to_root(&frames, source);
        let target_path = Self::path_to_root(&frames, target);

        let (src_idx, dst_idx) = source_path
            .iter()
            .enumerate()
            .find_map(|(i, f)| target_path.iter().position(|g| g == f).map(|j| (i, j)))
            .ok_or_else(unavailable)?;

        let t_common_source = self
            .compose_up(&frames, &source_path[..src_idx], timestamp_ns)
            .ok_or_else(unavailable)?;
        let t_common_target = self
            .compose_up(&frames, &target_path[..dst_idx], timestamp_ns)
            .ok_or_else(unavailable)?;

        Ok(t_common_target.inverse().compose(&t_common_source))
    }
}

fn interpolate(a: &SE3, b: &SE3, alpha: f64) -> SE3 {
    let alpha = alpha.clamp(0.0, 1.0);
    SE3 {
        rotation: a.rotation.try_slerp(&b.rotation, alpha, 1e-9).unwrap_or(a.rotation),
        translation: a.translation.lerp(&b.translation, alpha),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::FRAC_PI_2;

    const SEC: u64 = 1_000_000_000;

    fn create_test_tree() -> TransformTree {
        let tree = TransformTree::new(0);
        tree.set_static("map", "odom", SE3::from_translation(Vector3::new(10.0, 0.0, 0.0)));
        tree.set_static("base_link", "camera", SE3::from_translation(Vector3::new(0.0, 0.0, 1.0)));
        tree
    }

    #[test]
    fn test_identity_for_same_frame() {
        let tree = TransformTree::default();
        let tf = tree.resolve("map", "map", 0).unwrap();
        assert_eq!(tf, SE3::identity());
    }

    #[test]
    fn test_static_chain() {
        let tree = create_test_tree();
        tree.set_static("odom", "base_link", SE3::from_rpy(0.0, 0.0, FRAC_PI_2, Vector3::new(1.0, 0.0, 0.0)));

        let t_map_camera = tree.resolve("camera", "map", 0).unwrap();
        let p = t_map_camera.transform_point(&Vector3::new(1.0, 0.0, 0.0));
        // camera x-axis maps to map y-axis after the 90° yaw.
        assert_relative_eq!(p, Vector3::new(11.0, 1.0, 1.0), epsilon = 1e-9);

        let t_camera_map = tree.resolve("map", "camera", 0).unwrap();
        assert_relative_eq!(t_camera_map.transform_point(&p), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_disconnected_frames_unavailable() {
        let tree = create_test_tree();
        let err = tree.resolve("camera", "map", 5).unwrap_err();
        assert_eq!(
            err,
            TrackerError::TransformUnavailable {
                source_frame: "camera".to_string(),
                target_frame: "map".to_string(),
                timestamp_ns: 5,
            }
        );
    }

    #[test]
    fn test_dynamic_edge_interpolates() {
        let tree = create_test_tree();
        tree.update("odom", "base_link", 0, SE3::identity());
        tree.update("odom", "base_link", 2 * SEC, SE3::from_translation(Vector3::new(2.0, 0.0, 0.0)));

        let tf = tree.resolve("base_link", "map", SEC).unwrap();
        assert_relative_eq!(tf.translation, Vector3::new(11.0, 0.0, 0.0), epsilon = 1e-9);

        // Outside the buffered range with zero tolerance.
        assert!(tree.resolve("base_link", "map", 3 * SEC).is_err());
    }

    #[test]
    fn test_tolerance_allows_small_extrapolation() {
        let tree = TransformTree::new(SEC / 2);
        tree.update("map", "base_link", SEC, SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)));

        let tf = tree.resolve("base_link", "map", SEC + SEC / 4).unwrap();
        assert_relative_eq!(tf.translation, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-9);
        assert!(tree.resolve("base_link", "map", 2 * SEC).is_err());
        assert!(tree.has_frame("map"));
        assert!(!tree.has_frame("elsewhere"));
    }

    #[test]
    fn test_from_config() {
        let config = vec![StaticTransformConfig {
            parent: "map".to_string(),
            child: "camera".to_string(),
            translation: [0.0, 0.0, 2.0],
            rotation_rpy: [0.0, 0.0, 0.0],
        }];
        let tree = TransformTree::from_config(&config, 0);
        let tf = tree.resolve("camera", "map", 123).unwrap();
        assert_relative_eq!(tf.translation, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }
}
