//! Optional cross-validation of detections by external verification services.
//!
//! Services are registered per class id and sensor id, either of which may be
//! the wildcard `"*"`. Every applicable service is asked for a verdict; each
//! call runs on its own thread and is bounded by a timeout, so a slow or dead
//! service only costs the timeout. Failures count as "no opinion".

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::model::Observation;

/// Matches any class id or sensor id.
pub const WILDCARD: &str = "*";

/// Answer of one verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The detection is real.
    Confirm,
    /// No opinion.
    Unknown,
    /// The detection is a false positive and must be dropped.
    Discard,
}

/// What a verification service gets to look at.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Sensor the percept came from, if any (pose percepts use their frame).
    pub sensor_id: String,
    /// The observation, already in the world frame.
    pub observation: Observation,
}

pub trait VerificationService: Send + Sync {
    fn name(&self) -> &str;

    fn verify(&self, request: &VerificationRequest) -> TrackerResult<Verdict>;
}

/// Verification services keyed by class id, then sensor id.
#[derive(Clone)]
pub struct VerificationRegistry {
    services: HashMap<String, HashMap<String, Vec<Arc<dyn VerificationService>>>>,
    timeout: Duration,
}

impl VerificationRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            services: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, class_id: &str, sensor_id: &str, service: Arc<dyn VerificationService>) {
        self.services
            .entry(class_id.to_string())
            .or_default()
            .entry(sensor_id.to_string())
            .or_default()
            .push(service);
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Every service registered for this class/sensor pair, wildcards included.
    fn services_for(&self, class_id: &str, sensor_id: &str) -> Vec<Arc<dyn VerificationService>> {
        let mut found = Vec::new();
        for class_key in [class_id, WILDCARD] {
            let Some(by_sensor) = self.services.get(class_key) else {
                continue;
            };
            for sensor_key in [sensor_id, WILDCARD] {
                if let Some(services) = by_sensor.get(sensor_key) {
                    found.extend(services.iter().cloned());
                }
                if sensor_id == WILDCARD {
                    break;
                }
            }
            if class_id == WILDCARD {
                break;
            }
        }
        found
    }

    /// Ask every applicable service. Any `Discard` wins, then any `Confirm`.
    pub fn verify(&self, request: &VerificationRequest) -> Verdict {
        let services = self.services_for(&request.observation.class_id, &request.sensor_id);
        if services.is_empty() {
            return Verdict::Unknown;
        }

        let mut confirmed = false;
        for service in services {
            match self.call_with_timeout(service, request) {
                Ok(Verdict::Discard) => return Verdict::Discard,
                Ok(Verdict::Confirm) => confirmed = true,
                Ok(Verdict::Unknown) => {}
                Err(err) => warn!("Treating {} percept as unverified: {}", request.observation.class_id, err),
            }
        }
        if confirmed { Verdict::Confirm } else { Verdict::Unknown }
    }

    fn call_with_timeout(
        &self,
        service: Arc<dyn VerificationService>,
        request: &VerificationRequest,
    ) -> TrackerResult<Verdict> {
        let name = service.name().to_string();
        let (sender, receiver) = bounded(1);
        let owned = request.clone();
        thread::Builder::new()
            .name(format!("verify-{}", name))
            .spawn(move || {
                // The receiver may already have given up.
                let _ = sender.send(service.verify(&owned));
            })
            .map_err(|e| TrackerError::VerificationFailed(format!("{}: {}", name, e)))?;

        match receiver.recv_timeout(self.timeout) {
            Ok(result) => {
                debug!("Verification service '{}' answered {:?}", name, result);
                result.map_err(|e| TrackerError::VerificationFailed(format!("{}: {}", name, e)))
            }
            Err(RecvTimeoutError::Timeout) => Err(TrackerError::VerificationFailed(format!(
                "{} timed out after {:?}",
                name, self.timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(TrackerError::VerificationFailed(format!(
                "{} terminated without answering",
                name
            ))),
        }
    }
}

impl Default for VerificationRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}
