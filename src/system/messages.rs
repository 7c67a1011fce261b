//! Publication messages and their fan-out to subscribers.
//!
//! Every subscriber gets its own unbounded channel so a slow consumer never
//! blocks the tracker. Subscribers that drop their receiver are pruned on the
//! next publish.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::trace;

use crate::model::{ModelSnapshot, ObjectUpdate};

/// What the tracker emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Publication {
    /// Full model, on every publish interval and after each remote merge.
    Model(ModelSnapshot),
    /// Incremental event for one object.
    Update(ObjectUpdate),
}

#[derive(Default)]
pub struct Publisher {
    subscribers: Mutex<Vec<Sender<Publication>>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Publication> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn publish(&self, publication: Publication) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.send(publication.clone()).is_ok());
        trace!("Published to {} subscribers", subscribers.len());
    }

    /// Publish one update event, unless it is of a kind subscribers never see.
    pub fn publish_update(&self, update: ObjectUpdate) {
        if update.is_published() {
            self.publish(Publication::Update(update));
        }
    }

    pub fn publish_updates(&self, updates: impl IntoIterator<Item = ObjectUpdate>) {
        for update in updates {
            self.publish_update(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectId, ObjectState, Observation, TrackedObject, UpdateKind};
    use nalgebra::Vector3;

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let publisher = Publisher::new();
        let kept = publisher.subscribe();
        let dropped = publisher.subscribe();
        drop(dropped);

        publisher.publish(Publication::Model(ModelSnapshot::default()));
        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), Publication::Model(ModelSnapshot::default()));
    }

    #[test]
    fn test_update_publication_policy() {
        let publisher = Publisher::new();
        let receiver = publisher.subscribe();
        let object = TrackedObject::new(
            ObjectId::from("victim_1"),
            &Observation::at_position("victim", Vector3::zeros(), 1.0, 0),
            1.0,
        );
        let kinds = [
            UpdateKind::Created,
            UpdateKind::Fused,
            UpdateKind::Transitioned {
                from: ObjectState::Pending,
                to: ObjectState::Active,
            },
            UpdateKind::Merged,
            UpdateKind::Renamed,
            UpdateKind::Forced {
                from: ObjectState::Active,
                to: ObjectState::Confirmed,
            },
        ];
        let mut updates: Vec<ObjectUpdate> = kinds.into_iter().map(|kind| ObjectUpdate::new(kind, &object)).collect();
        updates.push(ObjectUpdate::removed(object));
        publisher.publish_updates(updates);

        let published: Vec<UpdateKind> = receiver
            .try_iter()
            .map(|p| match p {
                Publication::Update(update) => update.kind,
                other => panic!("unexpected publication {:?}", other),
            })
            .collect();
        assert_eq!(published.len(), 6);
        assert!(!published.contains(&UpdateKind::Fused));
        assert!(published.contains(&UpdateKind::Renamed));
        assert!(published.contains(&UpdateKind::Merged));
        assert!(published.contains(&UpdateKind::Removed));
    }
}
