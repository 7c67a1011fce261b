//! ObjectTracker - the top-level struct that users interact with.
//!
//! It owns the shared state and the percept ingestor, exposes every event
//! source (percepts, system commands, ageing-rate control, remote models) and
//! the Mutation API, and spawns the scheduler thread.
//!
//! All methods take `&self` and may be called from any thread. Transform
//! lookups and verification calls happen before the model lock is taken.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{error, info, warn};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::model::{ModelMerger, ModelSnapshot, ObjectId, ObjectModel, ObjectState, ObjectUpdate, Observation};
use crate::perception::{
    CameraRegistry, ImagePercept, PerceptIngestor, PosePercept, TransformResolver, TransformTree,
    VerificationRegistry, VerificationService,
};

use super::messages::Publication;
use super::scheduler::Scheduler;
use super::services::{ServiceRequest, ServiceResponse};
use super::shared_state::SharedState;

/// Builder for an `ObjectTracker` with custom collaborators.
pub struct ObjectTrackerBuilder {
    config: TrackerConfig,
    transforms: Option<Arc<dyn TransformResolver>>,
    cameras: Option<CameraRegistry>,
    verifiers: Vec<(String, String, Arc<dyn VerificationService>)>,
}

impl ObjectTrackerBuilder {
    /// Use this transform resolver instead of the configured static tree.
    pub fn transforms(mut self, transforms: Arc<dyn TransformResolver>) -> Self {
        self.transforms = Some(transforms);
        self
    }

    /// Use these camera models instead of the configured pinhole cameras.
    pub fn cameras(mut self, cameras: CameraRegistry) -> Self {
        self.cameras = Some(cameras);
        self
    }

    pub fn verification_service(
        mut self,
        class_id: &str,
        sensor_id: &str,
        service: Arc<dyn VerificationService>,
    ) -> Self {
        self.verifiers
            .push((class_id.to_string(), sensor_id.to_string(), service));
        self
    }

    pub fn build(self) -> ObjectTracker {
        let config = self.config;
        let transforms = self.transforms.unwrap_or_else(|| {
            Arc::new(TransformTree::from_config(
                &config.static_transforms,
                config.transform_tolerance_ns(),
            ))
        });
        let cameras = self
            .cameras
            .unwrap_or_else(|| CameraRegistry::from_config(&config.cameras));
        let mut verification = VerificationRegistry::new(std::time::Duration::from_millis(
            config.verification.timeout_ms,
        ));
        for (class_id, sensor_id, service) in self.verifiers {
            verification.register(&class_id, &sensor_id, service);
        }

        let ingestor = PerceptIngestor::new(
            config.frame_id.clone(),
            cameras,
            transforms,
            verification,
            config.image_percepts.clone(),
        );
        let model_config = config.model_config();
        let merger = ModelMerger::with_peers(
            model_config.clone(),
            config.peers.iter().map(|p| p.prefix.as_str()),
        );
        let shared = SharedState::new(ObjectModel::new(model_config), merger);

        ObjectTracker {
            shared,
            ingestor,
            config,
            scheduler_handle: None,
            wake_sender: None,
        }
    }
}

/// Object tracker: fuses percepts into a confidence-scored object model.
pub struct ObjectTracker {
    shared: Arc<SharedState>,
    ingestor: PerceptIngestor,
    config: TrackerConfig,
    scheduler_handle: Option<JoinHandle<()>>,
    wake_sender: Option<Sender<()>>,
}

impl ObjectTracker {
    /// Tracker with the collaborators described by `config`.
    pub fn new(config: TrackerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: TrackerConfig) -> ObjectTrackerBuilder {
        ObjectTrackerBuilder {
            config,
            transforms: None,
            cameras: None,
            verifiers: Vec::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Receive every model publication and update event from now on.
    pub fn subscribe(&self) -> Receiver<Publication> {
        self.shared.publisher.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Percept Intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest a pose percept. `Ok(None)` if verification discarded it or it
    /// repeats the matched object's last observation.
    pub fn process_pose_percept(&self, percept: &PosePercept) -> TrackerResult<Option<ObjectUpdate>> {
        let observation = self.ingestor.ingest_pose(percept)?;
        Ok(observation.and_then(|obs| self.integrate(&obs)))
    }

    pub fn process_image_percept(&self, percept: &ImagePercept) -> TrackerResult<Option<ObjectUpdate>> {
        let observation = self.ingestor.ingest_image(percept)?;
        Ok(observation.and_then(|obs| self.integrate(&obs)))
    }

    /// Percept callback: errors only reach the log.
    pub fn handle_pose_percept(&self, percept: &PosePercept) {
        if let Err(err) = self.process_pose_percept(percept) {
            log_dropped_percept(&percept.class_id, &err);
        }
    }

    pub fn handle_image_percept(&self, percept: &ImagePercept) {
        if let Err(err) = self.process_image_percept(percept) {
            log_dropped_percept(&percept.class_id, &err);
        }
    }

    /// Integrate under the write lock, publish after releasing it.
    fn integrate(&self, observation: &Observation) -> Option<ObjectUpdate> {
        let update = self.shared.model.write().integrate(observation)?;
        self.shared.publisher.publish_update(update.clone());
        Some(update)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Free-text system command. Only `reset` is understood.
    pub fn handle_sys_command(&self, command: &str) {
        match command.trim() {
            "reset" => {
                info!("Resetting object model");
                {
                    let mut merger = self.shared.merger.lock();
                    let mut model = self.shared.model.write();
                    merger.reset();
                    model.reset();
                }
                self.shared.publish_model();
            }
            other => warn!("Ignoring unknown system command '{}'", other),
        }
    }

    /// Override the ageing decay factor.
    pub fn set_ageing_rate(&self, decay_factor: f64) {
        if !decay_factor.is_finite() || decay_factor < 0.0 {
            warn!("Ignoring invalid ageing rate {}", decay_factor);
            return;
        }
        self.shared.model.write().set_decay_factor(decay_factor);
        info!("Ageing decay factor set to {}", decay_factor);
    }

    /// Merge a peer's model, then publish the changes and the full model.
    pub fn handle_remote_model(&self, prefix: &str, snapshot: &ModelSnapshot) -> Vec<ObjectUpdate> {
        let updates = {
            let mut merger = self.shared.merger.lock();
            let mut model = self.shared.model.write();
            merger.merge_remote(prefix, snapshot, &mut model)
        };
        self.shared.publisher.publish_updates(updates.iter().cloned());
        self.shared.publish_model();
        updates
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation API
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_object_state(&self, id: &ObjectId, state: ObjectState) -> TrackerResult<()> {
        let update = self.shared.model.write().set_object_state(id, state)?;
        self.shared.publisher.publish_update(update);
        Ok(())
    }

    pub fn set_object_name(&self, id: &ObjectId, name: &str) -> TrackerResult<()> {
        let update = self.shared.model.write().set_object_name(id, name)?;
        self.shared.publisher.publish_update(update);
        Ok(())
    }

    /// Create an object without gating and return its id.
    pub fn add_object(
        &self,
        observation: &Observation,
        id: Option<ObjectId>,
        state: Option<ObjectState>,
    ) -> TrackerResult<ObjectId> {
        let update = self.shared.model.write().add_object(observation, id, state)?;
        let id = update.id.clone();
        self.shared.publisher.publish_update(update);
        Ok(id)
    }

    pub fn remove_object(&self, id: &ObjectId) -> TrackerResult<()> {
        let update = self.shared.model.write().remove_object(id)?;
        self.shared.publisher.publish_update(update);
        Ok(())
    }

    /// Consistent point-in-time copy of the model.
    pub fn get_object_model(&self) -> ModelSnapshot {
        self.shared.snapshot()
    }

    /// Request/response entry point for the Mutation API.
    pub fn call(&self, request: ServiceRequest) -> TrackerResult<ServiceResponse> {
        match request {
            ServiceRequest::SetObjectState { id, state } => {
                self.set_object_state(&id, state).map(|_| ServiceResponse::Done)
            }
            ServiceRequest::SetObjectName { id, name } => {
                self.set_object_name(&id, &name).map(|_| ServiceResponse::Done)
            }
            ServiceRequest::AddObject { observation, id, state } => self
                .add_object(&observation, id, state)
                .map(ServiceResponse::ObjectAdded),
            ServiceRequest::GetObjectModel => Ok(ServiceResponse::Model(self.get_object_model())),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────────

    /// One ageing pass at `now_ns`; removals are published.
    pub fn run_ageing_pass(&self, now_ns: u64) -> Vec<ObjectUpdate> {
        self.shared.run_ageing_pass(now_ns)
    }

    pub fn publish_model(&self) {
        self.shared.publish_model();
    }

    /// Spawn the scheduler thread. Calling it twice is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.scheduler_handle.is_some() {
            return Ok(());
        }
        let (wake_sender, wake_receiver) = unbounded();
        let shared = Arc::clone(&self.shared);
        let scheduler = Scheduler::from_config(&self.config);
        let handle = thread::Builder::new()
            .name("object-tracker-scheduler".to_string())
            .spawn(move || scheduler.run(shared, wake_receiver))
            .context("Failed to spawn scheduler thread")?;

        self.wake_sender = Some(wake_sender);
        self.scheduler_handle = Some(handle);
        Ok(())
    }

    /// True while the scheduler thread is running.
    pub fn is_running(&self) -> bool {
        self.scheduler_handle.is_some()
    }

    /// Stop the scheduler thread and wait for it.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();
        if let Some(sender) = self.wake_sender.take() {
            let _ = sender.send(());
        }
        if let Some(handle) = self.scheduler_handle.take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for ObjectTracker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn log_dropped_percept(class_id: &str, err: &TrackerError) {
    match err {
        TrackerError::UnknownSensor(_) => error!("Dropping {} percept: {}", class_id, err),
        e if e.is_percept_drop() => warn!("Dropping {} percept: {}", class_id, e),
        _ => error!("Dropping {} percept: {}", class_id, err),
    }
}
