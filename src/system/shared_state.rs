//! Shared state between the event sources and the scheduler thread.
//!
//! The `SharedState` struct holds the model, the peer mirrors, and the
//! publisher, each behind its own lock. Critical sections are one
//! integrate/ageing pass/mutation long; publishing happens after the lock is
//! released. When both are needed, `merger` is locked before `model`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::model::{ModelMerger, ModelSnapshot, ObjectModel, ObjectUpdate};

use super::messages::{Publication, Publisher};

pub struct SharedState {
    /// The authoritative local model.
    pub model: RwLock<ObjectModel>,

    /// Per-peer mirror models.
    pub merger: Mutex<ModelMerger>,

    /// Fan-out of model publications.
    pub publisher: Publisher,

    /// Request the scheduler thread to exit.
    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(model: ObjectModel, merger: ModelMerger) -> Arc<Self> {
        Arc::new(Self {
            model: RwLock::new(model),
            merger: Mutex::new(merger),
            publisher: Publisher::new(),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    /// Copy of the model taken under the read lock.
    pub fn snapshot(&self) -> ModelSnapshot {
        self.model.read().snapshot()
    }

    /// Age the model and publish the removals.
    pub fn run_ageing_pass(&self, now_ns: u64) -> Vec<ObjectUpdate> {
        let removed = self.model.write().age(now_ns);
        self.publisher.publish_updates(removed.iter().cloned());
        removed
    }

    /// Publish a full snapshot.
    pub fn publish_model(&self) {
        let snapshot = self.snapshot();
        self.publisher.publish(Publication::Model(snapshot));
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            model: RwLock::new(ObjectModel::default()),
            merger: Mutex::new(ModelMerger::new(Default::default())),
            publisher: Publisher::new(),
            shutdown_requested: AtomicBool::new(false),
        }
    }
}
