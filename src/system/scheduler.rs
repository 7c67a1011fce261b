//! Scheduler thread: periodic ageing passes and full-model publication.
//!
//! Runs independently of percept arrival. The loop sleeps on a wake channel
//! with a timeout so shutdown is noticed promptly.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::config::{TimeSource, TrackerConfig};

use super::shared_state::SharedState;

/// Upper bound on one sleep. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

pub struct Scheduler {
    ageing_interval: Duration,
    publish_interval: Duration,
    time_source: TimeSource,
}

impl Scheduler {
    pub fn new(ageing_interval: Duration, publish_interval: Duration, time_source: TimeSource) -> Self {
        Self {
            ageing_interval,
            publish_interval,
            time_source,
        }
    }

    /// Periods that are not valid durations fall back to one second.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            period(config.ageing_interval_s),
            period(config.publish_interval_s),
            config.time_source,
        )
    }

    /// Main thread loop. Returns when shutdown is requested or the wake
    /// channel disconnects.
    pub fn run(&self, shared: Arc<SharedState>, wake: Receiver<()>) {
        info!(
            "Scheduler started (ageing every {:?}, publish every {:?}, {:?} clock)",
            self.ageing_interval, self.publish_interval, self.time_source
        );
        let start = Instant::now();
        let mut next_ageing = start + self.ageing_interval;
        let mut next_publish = start + self.publish_interval;

        loop {
            if shared.is_shutdown_requested() {
                break;
            }

            let now = Instant::now();
            if now >= next_ageing {
                let now_ns = self.now_ns(&shared);
                let removed = shared.run_ageing_pass(now_ns);
                if !removed.is_empty() {
                    debug!("Ageing pass removed {} objects", removed.len());
                }
                next_ageing = advance(next_ageing, self.ageing_interval, now);
            }
            if now >= next_publish {
                shared.publish_model();
                next_publish = advance(next_publish, self.publish_interval, now);
            }

            let wait = next_ageing
                .min(next_publish)
                .saturating_duration_since(Instant::now())
                .min(RECV_TIMEOUT);
            match wake.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Scheduler stopped");
    }

    /// Current time on the configured clock, in nanoseconds.
    fn now_ns(&self, shared: &SharedState) -> u64 {
        match self.time_source {
            TimeSource::Wall => wall_clock_ns(),
            TimeSource::Percept => shared.model.read().stamp_ns(),
        }
    }
}

pub fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn period(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(d) if !d.is_zero() => d,
        _ => {
            warn!("Invalid scheduler period {}s, using {:?}", seconds, DEFAULT_PERIOD);
            DEFAULT_PERIOD
        }
    }
}

/// Next deadline after `now`, skipping missed ticks instead of bursting.
fn advance(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    if next <= now { now + interval } else { next }
}
