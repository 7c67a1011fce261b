//! Deterministic replay of a recorded percept log.
//!
//! Ageing runs on log time from inside the replay loop, so the scheduler
//! thread must not be running: results then depend only on the log.

use tracing::{debug, warn};

use crate::io::PerceptRecord;
use crate::perception::TransformTree;

use super::object_tracker::ObjectTracker;

/// Counts of what a replay fed into the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub percepts: usize,
    pub transforms: usize,
    pub commands: usize,
    pub ageing_passes: usize,
    /// Latest timestamp in the log, in nanoseconds.
    pub end_ns: u64,
}

/// Feed `records` through `tracker` in order.
///
/// `tf` rows update `transforms`, which should be the resolver the tracker was
/// built with. An ageing pass runs every `ageing_interval_ns` of log time and
/// once more at the end of the log.
pub fn replay_log(
    tracker: &ObjectTracker,
    transforms: &TransformTree,
    records: impl IntoIterator<Item = PerceptRecord>,
    ageing_interval_ns: u64,
) -> ReplayStats {
    if tracker.is_running() {
        warn!("Replaying while the scheduler runs; ageing will also follow the wall clock");
    }
    let ageing_interval_ns = ageing_interval_ns.max(1);
    let mut stats = ReplayStats::default();
    let mut next_ageing_ns: Option<u64> = None;

    for record in records {
        let t = record.timestamp_ns();
        match record {
            PerceptRecord::Pose(percept) => {
                tracker.handle_pose_percept(&percept);
                stats.percepts += 1;
            }
            PerceptRecord::Image(percept) => {
                tracker.handle_image_percept(&percept);
                stats.percepts += 1;
            }
            PerceptRecord::Transform {
                timestamp_ns,
                parent,
                child,
                transform,
            } => {
                transforms.update(&parent, &child, timestamp_ns, transform);
                stats.transforms += 1;
            }
            PerceptRecord::Command { command, .. } => {
                tracker.handle_sys_command(&command);
                stats.commands += 1;
            }
        }

        let due = *next_ageing_ns.get_or_insert(t.saturating_add(ageing_interval_ns));
        if t >= due {
            tracker.run_ageing_pass(t);
            stats.ageing_passes += 1;
            next_ageing_ns = Some(t.saturating_add(ageing_interval_ns));
        }
        stats.end_ns = stats.end_ns.max(t);
    }

    tracker.run_ageing_pass(stats.end_ns);
    stats.ageing_passes += 1;
    debug!("Replay finished: {:?}", stats);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TimeSource, TrackerConfig};
    use crate::geometry::PoseWithCovariance;
    use crate::model::ObjectId;
    use crate::perception::PosePercept;
    use nalgebra::Vector3;
    use std::sync::Arc;

    const SEC: u64 = 1_000_000_000;

    fn victim(x: f64, t: u64) -> PerceptRecord {
        PerceptRecord::Pose(PosePercept::new(
            "map",
            PoseWithCovariance::from_position(Vector3::new(x, 0.0, 0.0), 1.0),
            "victim",
            t,
        ))
    }

    fn create_test_tracker() -> (ObjectTracker, Arc<TransformTree>) {
        let config = TrackerConfig {
            time_source: TimeSource::Percept,
            ..TrackerConfig::default()
        };
        let transforms = Arc::new(TransformTree::new(0));
        let tracker = ObjectTracker::builder(config)
            .transforms(transforms.clone())
            .build();
        (tracker, transforms)
    }

    fn log() -> Vec<PerceptRecord> {
        vec![
            victim(0.0, 0),
            victim(0.0, SEC / 2),
            // Far away and late: the first object has been idle for 10s.
            victim(50.0, 10 * SEC),
            victim(50.0, 10 * SEC + SEC / 2),
        ]
    }

    #[test]
    fn test_replay_ages_on_log_time() {
        let (tracker, transforms) = create_test_tracker();
        let stats = replay_log(&tracker, &transforms, log(), SEC);

        assert!(!tracker.is_running());
        assert_eq!(stats.percepts, 4);
        assert_eq!(stats.end_ns, 10 * SEC + SEC / 2);
        assert_eq!(stats.ageing_passes, 2);

        let snapshot = tracker.get_object_model();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(&ObjectId::from("victim_1")).is_none());
        assert!(snapshot.get(&ObjectId::from("victim_2")).is_some());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let (first, first_tf) = create_test_tracker();
        replay_log(&first, &first_tf, log(), SEC);
        let (second, second_tf) = create_test_tracker();
        replay_log(&second, &second_tf, log(), SEC);

        assert_eq!(first.get_object_model(), second.get_object_model());
    }

    #[test]
    fn test_replay_commands_and_transforms() {
        let (tracker, transforms) = create_test_tracker();
        let records = vec![
            victim(0.0, 0),
            PerceptRecord::Transform {
                timestamp_ns: 0,
                parent: "map".to_string(),
                child: "base_link".to_string(),
                transform: crate::geometry::SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)),
            },
            PerceptRecord::Command {
                timestamp_ns: 1,
                command: "reset".to_string(),
            },
        ];
        let stats = replay_log(&tracker, &transforms, records, SEC);
        assert_eq!((stats.transforms, stats.commands), (1, 1));
        assert!(transforms.has_frame("base_link"));
        assert!(tracker.get_object_model().is_empty());
    }
}
