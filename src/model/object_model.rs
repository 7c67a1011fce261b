//! ObjectModel - the authoritative mapping of object id → TrackedObject.
//!
//! It provides methods for:
//! - Integrating observations (gating, fusion, state promotion)
//! - Ageing idle objects and discarding expired ones
//! - Operator mutations (force state, rename, add, delete)
//! - Applying objects received from a peer under its namespace
//! - Taking consistent snapshots
//!
//! The model is plain data with no interior locking; callers serialize access
//! (see `system::SharedState`).

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::{GateKind, ModelConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::geometry::{euclidean, mahalanobis_sq};

use super::events::{ModelSnapshot, ObjectUpdate, UpdateKind};
use super::object::TrackedObject;
use super::observation::Observation;
use super::types::{ObjectId, ObjectState};

/// The world model: every object currently believed to exist.
pub struct ObjectModel {
    /// All objects, keyed by id.
    objects: HashMap<ObjectId, TrackedObject>,

    /// Counter for generating object ids. Never rewinds, not even on reset.
    next_object_index: u64,

    /// Ids of deleted objects. They are never handed out again.
    retired_ids: HashSet<ObjectId>,

    /// Fusion and ageing parameters.
    config: ModelConfig,

    /// Latest observation timestamp integrated, in nanoseconds.
    stamp_ns: u64,
}

impl ObjectModel {
    /// Create a new empty model.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            objects: HashMap::new(),
            next_object_index: 0,
            retired_ids: HashSet::new(),
            config,
            stamp_ns: 0,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Override the ageing decay factor at runtime.
    pub fn set_decay_factor(&mut self, decay_factor: f64) {
        self.config.ageing.decay_factor = decay_factor.max(0.0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_object(&self, id: &ObjectId) -> Option<&TrackedObject> {
        self.objects.get(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn stamp_ns(&self) -> u64 {
        self.stamp_ns
    }

    /// True if `id` belonged to an object that has since been deleted.
    pub fn is_retired(&self, id: &ObjectId) -> bool {
        self.retired_ids.contains(id)
    }

    /// Point-in-time copy of every object, sorted by id.
    pub fn snapshot(&self) -> ModelSnapshot {
        let mut objects: Vec<TrackedObject> = self.objects.values().cloned().collect();
        objects.sort_by(|a, b| a.id.cmp(&b.id));
        ModelSnapshot {
            frame_id: self.config.frame_id.clone(),
            stamp_ns: self.stamp_ns,
            objects,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // ID Generation
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a fresh id of the form `{class}_{n}`.
    fn next_object_id(&mut self, class_id: &str) -> ObjectId {
        let stem = if class_id.is_empty() { "object" } else { class_id };
        loop {
            self.next_object_index += 1;
            let id = ObjectId::new(format!("{}_{}", stem, self.next_object_index));
            if !self.objects.contains_key(&id) && !self.retired_ids.contains(&id) {
                return id;
            }
        }
    }

    /// Insert a fully built object. A duplicate id is a corruption: the new
    /// entry is dropped and the existing one kept.
    fn insert_object(&mut self, object: TrackedObject) -> TrackerResult<()> {
        if self.objects.contains_key(&object.id) {
            let err = TrackerError::ModelCorruption(format!("duplicate object id '{}'", object.id));
            warn!("{}", err);
            return Err(err);
        }
        self.objects.insert(object.id.clone(), object);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Integration
    // ─────────────────────────────────────────────────────────────────────────

    /// Gate distance between an object and an observation, in the configured metric.
    fn gate_distance(&self, object: &TrackedObject, observation: &Observation) -> f64 {
        match self.config.fusion.gate.kind {
            GateKind::Mahalanobis => mahalanobis_sq(&object.pose, &observation.pose).sqrt(),
            GateKind::Euclidean => euclidean(&object.pose, &observation.pose),
        }
    }

    /// Find the nearest local object of the same class inside the gate.
    ///
    /// Merged objects are never matched: their identity belongs to the peer.
    pub fn find_match(&self, observation: &Observation) -> Option<(ObjectId, f64)> {
        self.objects
            .values()
            .filter(|obj| !obj.is_merged() && obj.class_id == observation.class_id)
            .map(|obj| (obj, self.gate_distance(obj, observation)))
            .filter(|(_, d)| *d <= self.config.fusion.gate.threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(obj, d)| (obj.id.clone(), d))
    }

    /// Integrate one observation.
    ///
    /// Matches it to the nearest gated object and fuses, or creates a new
    /// `Pending` object. Returns the update event, or `None` when the
    /// observation repeats the matched object's last one.
    pub fn integrate(&mut self, observation: &Observation) -> Option<ObjectUpdate> {
        self.stamp_ns = self.stamp_ns.max(observation.timestamp_ns);

        let Some((id, distance)) = self.find_match(observation) else {
            let id = self.next_object_id(&observation.class_id);
            let object = TrackedObject::new(id, observation, self.config.fusion.initial_support);
            let update = ObjectUpdate::new(UpdateKind::Created, &object);
            debug!(
                "Created {} ({}) at [{:.2}, {:.2}, {:.2}]",
                object.id,
                object.class_id,
                object.pose.position().x,
                object.pose.position().y,
                object.pose.position().z
            );
            self.insert_object(object).ok()?;
            return Some(update);
        };

        let fusion = &self.config.fusion;
        let object = self.objects.get_mut(&id)?;
        if object.is_duplicate(observation) {
            debug!("Ignoring duplicate observation of {}", id);
            return None;
        }

        object.fuse_observation(observation, fusion);
        let kind = match object.promote(fusion) {
            Some(from) => {
                info!(
                    "{} {} -> {} (support {:.2})",
                    object.id, from, object.state, object.support
                );
                UpdateKind::Transitioned {
                    from,
                    to: object.state,
                }
            }
            None => UpdateKind::Fused,
        };
        debug!(
            "Fused observation into {} (distance {:.3}, support {:.2})",
            object.id, distance, object.support
        );
        Some(ObjectUpdate::new(kind, object))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ageing
    // ─────────────────────────────────────────────────────────────────────────

    /// Decay support of idle objects and discard those that expire.
    ///
    /// Merged objects are skipped: their support is owned by the peer.
    /// Returns one `Removed` event per discarded object. Running the pass
    /// twice at the same `now_ns` changes nothing the second time.
    pub fn age(&mut self, now_ns: u64) -> Vec<ObjectUpdate> {
        let window_ns = self.config.ageing.window_ns();
        let decay_factor = self.config.ageing.decay_factor;
        let discard_threshold = self.config.ageing.discard_threshold;

        let mut expired: Vec<ObjectId> = Vec::new();
        for object in self.objects.values_mut().filter(|obj| !obj.is_merged()) {
            if object.age(now_ns, window_ns, decay_factor) {
                debug!("Aged {} to support {:.2}", object.id, object.support);
                if object.support <= discard_threshold {
                    expired.push(object.id.clone());
                }
            }
        }

        let mut updates = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(object) = self.objects.remove(&id) {
                info!("Discarding {} ({}) after ageing", object.id, object.state);
                self.retired_ids.insert(id);
                updates.push(ObjectUpdate::removed(object));
            }
        }
        updates
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operator Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Force an object's state. `Discarded` removes it.
    pub fn set_object_state(&mut self, id: &ObjectId, state: ObjectState) -> TrackerResult<ObjectUpdate> {
        if state == ObjectState::Discarded {
            return self.remove_object(id);
        }
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| TrackerError::ObjectNotFound(id.clone()))?;
        let from = object.state;
        object.force_state(state);
        info!("{} forced {} -> {}", id, from, state);
        Ok(ObjectUpdate::new(UpdateKind::Forced { from, to: state }, object))
    }

    pub fn set_object_name(&mut self, id: &ObjectId, name: &str) -> TrackerResult<ObjectUpdate> {
        let object = self
            .objects
            .get_mut(id)
            .ok_or_else(|| TrackerError::ObjectNotFound(id.clone()))?;
        object.name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Ok(ObjectUpdate::new(UpdateKind::Renamed, object))
    }

    /// Create an object without matching or gating.
    ///
    /// `requested_id` must not already exist and must not belong to a deleted
    /// object. A given `state` is applied as an operator override.
    pub fn add_object(
        &mut self,
        observation: &Observation,
        requested_id: Option<ObjectId>,
        state: Option<ObjectState>,
    ) -> TrackerResult<ObjectUpdate> {
        if state == Some(ObjectState::Discarded) {
            return Err(TrackerError::InvalidState(ObjectState::Discarded.to_string()));
        }
        let id = match requested_id {
            Some(id) if self.retired_ids.contains(&id) => {
                let err = TrackerError::ModelCorruption(format!("id '{}' belonged to a deleted object", id));
                warn!("{}", err);
                return Err(err);
            }
            Some(id) => id,
            None => self.next_object_id(&observation.class_id),
        };

        let mut object = TrackedObject::new(id, observation, self.config.fusion.initial_support);
        if let Some(state) = state {
            object.force_state(state);
        }
        let update = ObjectUpdate::new(UpdateKind::Created, &object);
        self.insert_object(object)?;
        self.stamp_ns = self.stamp_ns.max(observation.timestamp_ns);
        info!("Added {} ({})", update.id, update.object.state);
        Ok(update)
    }

    /// Administrative delete.
    pub fn remove_object(&mut self, id: &ObjectId) -> TrackerResult<ObjectUpdate> {
        let object = self
            .objects
            .remove(id)
            .ok_or_else(|| TrackerError::ObjectNotFound(id.clone()))?;
        self.retired_ids.insert(id.clone());
        info!("Removed {}", id);
        Ok(ObjectUpdate::removed(object))
    }

    /// Drop every object. The id counter keeps counting and the dropped ids
    /// are retired.
    pub fn reset(&mut self) {
        self.retired_ids.extend(self.objects.drain().map(|(id, _)| id));
        self.stamp_ns = 0;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Merging
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a peer's object under `prefix`, updating in place by namespaced id.
    ///
    /// No gating happens. Applying the same remote object twice yields `None`
    /// the second time. A `Discarded` remote removes the local copy. An id
    /// held by a local object or another peer is a corruption and the remote
    /// entry is dropped. Merged ids belong to the peer, so a retired merged id
    /// may come back when the peer reports it again.
    pub fn merge_object(&mut self, prefix: &str, remote: &TrackedObject) -> TrackerResult<Option<ObjectUpdate>> {
        if prefix.is_empty() {
            return Err(TrackerError::ModelCorruption(format!(
                "refusing to merge '{}' without a namespace prefix",
                remote.id
            )));
        }

        let id = remote.id.prefixed(prefix);
        if remote.state == ObjectState::Discarded {
            let owned = self.objects.get(&id).is_some_and(|obj| obj.source_prefix == prefix);
            if !owned {
                return Ok(None);
            }
            info!("Peer '{}' discarded {}", prefix, id);
            return self.remove_object(&id).map(Some);
        }
        self.stamp_ns = self.stamp_ns.max(remote.last_observed_at);

        let Some(existing) = self.objects.get_mut(&id) else {
            let object = TrackedObject {
                id,
                class_id: remote.class_id.clone(),
                pose: remote.pose.clone(),
                state: remote.state,
                support: remote.support.max(0.0),
                last_observed_at: remote.last_observed_at,
                name: remote.name.clone(),
                source_prefix: prefix.to_string(),
                forced: false,
                reference_support: remote.support.max(0.0),
                last_aged_at: remote.last_observed_at,
            };
            let update = ObjectUpdate::new(UpdateKind::Merged, &object);
            self.insert_object(object)?;
            return Ok(Some(update));
        };

        if existing.source_prefix != prefix {
            let err = TrackerError::ModelCorruption(format!(
                "merged id '{}' collides with an object owned by '{}'",
                id, existing.source_prefix
            ));
            warn!("{}", err);
            return Err(err);
        }

        let unchanged = existing.class_id == remote.class_id
            && existing.pose == remote.pose
            && existing.support == remote.support
            && (existing.forced || existing.state == remote.state)
            && (remote.name.is_none() || existing.name == remote.name);
        if unchanged {
            return Ok(None);
        }

        existing.class_id = remote.class_id.clone();
        existing.pose = remote.pose.clone();
        existing.support = remote.support.max(0.0);
        existing.reference_support = existing.support;
        if !existing.forced {
            existing.state = remote.state;
        }
        if remote.name.is_some() {
            existing.name = remote.name.clone();
        }
        existing.last_observed_at = existing.last_observed_at.max(remote.last_observed_at);
        existing.last_aged_at = existing.last_aged_at.max(existing.last_observed_at);
        Ok(Some(ObjectUpdate::new(UpdateKind::Merged, existing)))
    }

    /// Replace the whole content with a snapshot, keeping remote ids as they are.
    ///
    /// Used for the per-peer mirror models. Duplicate ids in the snapshot are
    /// dropped and reported.
    pub fn replace_with(&mut self, snapshot: &ModelSnapshot) -> Vec<TrackerError> {
        self.objects.clear();
        self.stamp_ns = snapshot.stamp_ns;
        snapshot
            .objects
            .iter()
            .filter_map(|object| self.insert_object(object.clone()).err())
            .collect()
    }
}

impl Default for ObjectModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl std::fmt::Debug for ObjectModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectModel")
            .field("frame_id", &self.config.frame_id)
            .field("num_objects", &self.objects.len())
            .field("next_object_index", &self.next_object_index)
            .field("stamp_ns", &self.stamp_ns)
            .finish()
    }
}
