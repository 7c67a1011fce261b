//! ModelMerger - incorporates remote peers' models under their namespace.
//!
//! One mirror `ObjectModel` is kept per peer prefix, holding the peer's
//! latest snapshot with its own ids. Merging applies every mirrored object to
//! the local model by namespaced id (update in place, no gating) and removes
//! local copies of objects the peer no longer reports.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::config::ModelConfig;

use super::events::{ModelSnapshot, ObjectUpdate};
use super::object_model::ObjectModel;
use super::types::ObjectId;

pub struct ModelMerger {
    /// Mirror of each peer's model, keyed by prefix.
    peers: HashMap<String, ObjectModel>,

    /// Config used for mirrors of peers added at runtime.
    model_config: ModelConfig,
}

impl ModelMerger {
    pub fn new(model_config: ModelConfig) -> Self {
        Self {
            peers: HashMap::new(),
            model_config,
        }
    }

    /// Build with one mirror per configured prefix.
    pub fn with_peers<'a>(model_config: ModelConfig, prefixes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut merger = Self::new(model_config);
        for prefix in prefixes {
            merger.add_peer(prefix);
        }
        merger
    }

    /// Register a peer. Returns false if it was already known.
    pub fn add_peer(&mut self, prefix: &str) -> bool {
        if self.peers.contains_key(prefix) {
            return false;
        }
        self.peers
            .insert(prefix.to_string(), ObjectModel::new(self.model_config.clone()));
        true
    }

    pub fn has_peer(&self, prefix: &str) -> bool {
        self.peers.contains_key(prefix)
    }

    pub fn peer_prefixes(&self) -> impl Iterator<Item = &str> {
        self.peers.keys().map(String::as_str)
    }

    pub fn peer_model(&self, prefix: &str) -> Option<&ObjectModel> {
        self.peers.get(prefix)
    }

    /// Clear every mirror (system `reset`).
    pub fn reset(&mut self) {
        for mirror in self.peers.values_mut() {
            mirror.reset();
        }
    }

    /// Merge a peer snapshot into `local`.
    ///
    /// Unknown prefixes are registered on the fly. Entries that would corrupt
    /// the local model are logged and dropped; the rest still merge. Returns
    /// the events for every object that changed.
    pub fn merge_remote(
        &mut self,
        prefix: &str,
        snapshot: &ModelSnapshot,
        local: &mut ObjectModel,
    ) -> Vec<ObjectUpdate> {
        if prefix.is_empty() {
            warn!("Ignoring remote model without a namespace prefix");
            return Vec::new();
        }
        if self.add_peer(prefix) {
            info!("Registered new peer '{}'", prefix);
        }
        let Some(mirror) = self.peers.get_mut(prefix) else {
            return Vec::new();
        };

        for err in mirror.replace_with(snapshot) {
            warn!("Peer '{}' snapshot: {}", prefix, err);
        }

        let mut updates = Vec::new();
        let mut present: HashSet<ObjectId> = HashSet::new();
        for remote in mirror.objects() {
            present.insert(remote.id.prefixed(prefix));
            match local.merge_object(prefix, remote) {
                Ok(Some(update)) => updates.push(update),
                Ok(None) => {}
                Err(err) => warn!("Dropping remote object {}{}: {}", prefix, remote.id, err),
            }
        }

        let vanished: Vec<ObjectId> = local
            .objects()
            .filter(|obj| obj.source_prefix == prefix && !present.contains(&obj.id))
            .map(|obj| obj.id.clone())
            .collect();
        for id in vanished {
            if let Ok(update) = local.remove_object(&id) {
                info!("Peer '{}' no longer reports {}", prefix, id);
                updates.push(update);
            }
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Observation, ObjectState, UpdateKind};
    use nalgebra::Vector3;

    fn peer_snapshot(points: &[(f64, f64)]) -> ModelSnapshot {
        let mut peer = ObjectModel::default();
        for (i, (x, y)) in points.iter().enumerate() {
            peer.integrate(&Observation::at_position("victim", Vector3::new(*x, *y, 0.0), 1.0, i as u64));
        }
        peer.snapshot()
    }

    #[test]
    fn test_merge_namespaces_ids() {
        let mut merger = ModelMerger::with_peers(ModelConfig::default(), ["robot2/"]);
        let mut local = ObjectModel::default();
        local.integrate(&Observation::at_position("victim", Vector3::zeros(), 1.0, 0));

        let updates = merger.merge_remote("robot2/", &peer_snapshot(&[(0.0, 0.0), (20.0, 0.0)]), &mut local);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.kind == UpdateKind::Merged));

        assert_eq!(local.len(), 3);
        assert!(local.get_object(&ObjectId::from("victim_1")).is_some());
        assert!(local.get_object(&ObjectId::from("robot2/victim_1")).is_some());
        assert!(local.get_object(&ObjectId::from("robot2/victim_2")).is_some());
        assert_eq!(merger.peer_model("robot2/").unwrap().len(), 2);
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        let snapshot = peer_snapshot(&[(1.0, 1.0), (30.0, 0.0)]);

        merger.merge_remote("robot2/", &snapshot, &mut local);
        let first = local.snapshot();

        let updates = merger.merge_remote("robot2/", &snapshot, &mut local);
        assert!(updates.is_empty());
        assert_eq!(local.snapshot(), first);
        assert!(merger.has_peer("robot2/"));
    }

    #[test]
    fn test_vanished_remote_object_is_removed() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        merger.merge_remote("robot2/", &peer_snapshot(&[(1.0, 1.0), (30.0, 0.0)]), &mut local);

        let updates = merger.merge_remote("robot2/", &peer_snapshot(&[(1.0, 1.0)]), &mut local);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, UpdateKind::Removed);
        assert_eq!(updates[0].id, ObjectId::from("robot2/victim_2"));
        assert_eq!(updates[0].object.state, ObjectState::Discarded);
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_peer_discard_removes_local_copy() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        let mut snapshot = peer_snapshot(&[(1.0, 1.0), (30.0, 0.0)]);
        merger.merge_remote("robot2/", &snapshot, &mut local);
        assert_eq!(local.len(), 2);

        snapshot.objects[0].state = ObjectState::Discarded;
        let updates = merger.merge_remote("robot2/", &snapshot, &mut local);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, UpdateKind::Removed);
        assert_eq!(updates[0].id, ObjectId::from("robot2/victim_1"));
        assert!(local.get_object(&ObjectId::from("robot2/victim_1")).is_none());
        assert_eq!(local.len(), 1);

        assert!(merger.merge_remote("robot2/", &snapshot, &mut local).is_empty());
    }

    #[test]
    fn test_peers_do_not_collide() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        let snapshot = peer_snapshot(&[(1.0, 1.0)]);

        merger.merge_remote("robot2/", &snapshot, &mut local);
        merger.merge_remote("robot3/", &snapshot, &mut local);
        assert_eq!(local.len(), 2);

        // An empty snapshot from robot3 only removes robot3's copy.
        merger.merge_remote("robot3/", &ModelSnapshot::default(), &mut local);
        assert_eq!(local.len(), 1);
        assert!(local.get_object(&ObjectId::from("robot2/victim_1")).is_some());
    }

    #[test]
    fn test_corrupt_entry_dropped_rest_merged() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        local
            .add_object(
                &Observation::at_position("victim", Vector3::zeros(), 1.0, 0),
                Some(ObjectId::from("robot2/victim_1")),
                None,
            )
            .unwrap();

        let updates = merger.merge_remote("robot2/", &peer_snapshot(&[(1.0, 1.0), (30.0, 0.0)]), &mut local);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, ObjectId::from("robot2/victim_2"));
        assert_eq!(local.get_object(&ObjectId::from("robot2/victim_1")).unwrap().source_prefix, "");
    }

    #[test]
    fn test_reset_clears_mirrors() {
        let mut merger = ModelMerger::new(ModelConfig::default());
        let mut local = ObjectModel::default();
        merger.merge_remote("robot2/", &peer_snapshot(&[(1.0, 1.0)]), &mut local);

        merger.reset();
        assert!(merger.peer_model("robot2/").unwrap().is_empty());
        assert!(merger.merge_remote("", &peer_snapshot(&[(0.0, 0.0)]), &mut local).is_empty());
    }
}
