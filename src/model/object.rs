//! TrackedObject - one physically distinct real-world object candidate.
//!
//! A TrackedObject accumulates support from corroborating observations,
//! loses it while idle, and carries its confidence state. Fusion replaces the
//! pose and covariance in one assignment so a copy never pairs a new pose
//! with an old covariance.

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::geometry::{PoseWithCovariance, fuse};

use super::observation::Observation;
use super::types::{ObjectId, ObjectState};

/// A tracked object in the world model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Stable identifier, immutable after creation.
    pub id: ObjectId,

    /// Semantic label (e.g. "victim"), may be empty.
    pub class_id: String,

    /// Fused pose with covariance in the model frame.
    pub pose: PoseWithCovariance,

    /// Confidence state.
    pub state: ObjectState,

    /// Accumulated evidence weight, never negative.
    pub support: f64,

    /// Timestamp of the most recent integrated observation, in nanoseconds.
    pub last_observed_at: u64,

    /// Human-assigned label.
    pub name: Option<String>,

    /// Empty for local objects, the peer namespace for merged ones.
    pub source_prefix: String,

    /// True once an operator forced the state; evidence no longer changes it.
    pub forced: bool,

    /// Support right after the last observation; ageing decays relative to it.
    #[serde(default)]
    pub(crate) reference_support: f64,

    /// Time up to which ageing has already been applied.
    #[serde(default)]
    pub(crate) last_aged_at: u64,
}

impl TrackedObject {
    /// Create a local object from its first observation.
    pub fn new(id: ObjectId, observation: &Observation, initial_support: f64) -> Self {
        Self {
            id,
            class_id: observation.class_id.clone(),
            pose: observation.pose.clone(),
            state: ObjectState::Pending,
            support: initial_support.max(0.0),
            last_observed_at: observation.timestamp_ns,
            name: observation.name.clone(),
            source_prefix: String::new(),
            forced: false,
            reference_support: initial_support.max(0.0),
            last_aged_at: observation.timestamp_ns,
        }
    }

    pub fn is_merged(&self) -> bool {
        !self.source_prefix.is_empty()
    }

    /// True if `observation` repeats the last one integrated into this object.
    pub fn is_duplicate(&self, observation: &Observation) -> bool {
        observation.timestamp_ns == self.last_observed_at
            && (observation.pose.position() - self.pose.position()).norm() < 1e-9
    }

    /// Fuse a corroborating observation: pose, support and timestamps.
    ///
    /// Out-of-order observations are fused but never move
    /// `last_observed_at` backwards.
    pub fn fuse_observation(&mut self, observation: &Observation, config: &FusionConfig) {
        self.pose = fuse(&self.pose, &observation.pose, config.min_covariance);
        self.support += config.support_increment * observation.confidence.clamp(0.0, 1.0);
        self.reference_support = self.support;
        if observation.timestamp_ns > self.last_observed_at {
            self.last_observed_at = observation.timestamp_ns;
        }
        self.last_aged_at = self.last_aged_at.max(self.last_observed_at);
        if self.class_id.is_empty() && !observation.class_id.is_empty() {
            self.class_id = observation.class_id.clone();
        }
    }

    /// Promote along `Pending → Active → Confirmed` as support allows.
    ///
    /// Returns the previous state if it changed. Forced objects are left alone.
    pub fn promote(&mut self, config: &FusionConfig) -> Option<ObjectState> {
        if self.forced {
            return None;
        }
        let previous = self.state;
        if self.state == ObjectState::Pending && self.support >= config.active_threshold {
            self.state = ObjectState::Active;
        }
        if self.state == ObjectState::Active && self.support >= config.confirmed_threshold {
            self.state = ObjectState::Confirmed;
        }
        (self.state != previous).then_some(previous)
    }

    /// Operator override of the state; sticky until the next override.
    pub fn force_state(&mut self, state: ObjectState) {
        self.state = state;
        self.forced = true;
    }

    /// Decay support for the time elapsed since the last ageing step.
    ///
    /// Only objects idle for at least `window_ns` decay. The loss is
    /// `decay_factor * reference_support` per window of elapsed time.
    /// Returns true if support changed.
    pub fn age(&mut self, now_ns: u64, window_ns: u64, decay_factor: f64) -> bool {
        if window_ns == 0 || now_ns.saturating_sub(self.last_observed_at) < window_ns {
            return false;
        }
        let since = self.last_aged_at.max(self.last_observed_at);
        let elapsed = now_ns.saturating_sub(since);
        self.last_aged_at = self.last_aged_at.max(now_ns);
        if elapsed == 0 {
            return false;
        }

        let windows = elapsed as f64 / window_ns as f64;
        let decrement = decay_factor * self.reference_support * windows;
        let support = (self.support - decrement).max(0.0);
        let changed = support != self.support;
        self.support = support;
        changed
    }
}
