//! In-memory execution registry and per-tier execution lanes.
//!
//! The registry is the authoritative record of every dispatched job: callers
//! poll it through the status endpoint, workers write terminal states into it.
//! Entries live only for this process; terminal records are swept once the
//! retention window passes, after which the handle resolves to unknown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DispatchSettings;
use crate::domain::{job::RenderOutcome, tier::ComputeTier};

/// Projection of one execution's current state.
#[derive(Debug, Clone)]
pub enum ExecutionState {
    Running,
    Completed(RenderOutcome),
    Failed(String),
}

impl ExecutionState {
    fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Running)
    }
}

#[derive(Debug)]
struct ExecutionRecord {
    job_id: String,
    state: ExecutionState,
    finished_at: Option<OffsetDateTime>,
}

/// Handle-keyed map of in-flight and recently finished executions.
///
/// Terminal transitions are monotonic: once a record is completed or failed it
/// never changes again, so repeated status polls observe the same answer.
#[derive(Debug)]
pub struct ExecutionRegistry {
    entries: DashMap<Uuid, ExecutionRecord>,
    retention: Duration,
}

impl ExecutionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Register a freshly dispatched job and return its polling handle.
    pub fn register(&self, job_id: &str) -> Uuid {
        let handle = Uuid::new_v4();
        self.entries.insert(
            handle,
            ExecutionRecord {
                job_id: job_id.to_string(),
                state: ExecutionState::Running,
                finished_at: None,
            },
        );
        handle
    }

    /// Zero-wait lookup. `None` means the handle was never issued here or its
    /// record has already been swept.
    pub fn lookup(&self, handle: Uuid) -> Option<ExecutionState> {
        self.entries.get(&handle).map(|entry| entry.state.clone())
    }

    pub fn record_completed(&self, handle: Uuid, outcome: RenderOutcome) {
        self.transition(handle, ExecutionState::Completed(outcome));
    }

    pub fn record_failed(&self, handle: Uuid, message: String) {
        self.transition(handle, ExecutionState::Failed(message));
    }

    fn transition(&self, handle: Uuid, next: ExecutionState) {
        let Some(mut entry) = self.entries.get_mut(&handle) else {
            warn!(
                target = "fucina::registry",
                handle = %handle,
                "terminal state reported for an unregistered handle"
            );
            return;
        };

        if entry.state.is_terminal() {
            warn!(
                target = "fucina::registry",
                handle = %handle,
                job_id = entry.job_id,
                "ignoring state transition out of a terminal state"
            );
            return;
        }

        entry.state = next;
        entry.finished_at = Some(OffsetDateTime::now_utc());
    }

    /// Drop terminal records older than the retention window.
    pub fn sweep(&self) {
        let cutoff = OffsetDateTime::now_utc() - self.retention;
        // Counted inside the closure: registrations can land mid-retain, so a
        // before/after length difference is not a removal count.
        let mut removed = 0usize;
        self.entries.retain(|_, record| match record.finished_at {
            Some(finished_at) if finished_at <= cutoff => {
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            debug!(
                target = "fucina::registry",
                removed,
                remaining = self.entries.len(),
                "swept expired job records"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An execution slot: a lane permit plus the leased front-end port.
///
/// Both are returned when the slot drops, so a crashed worker still frees its
/// lane and port.
pub struct LaneSlot {
    port: u16,
    ports: Arc<Mutex<Vec<u16>>>,
    _permit: OwnedSemaphorePermit,
}

impl LaneSlot {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for LaneSlot {
    fn drop(&mut self) {
        metrics::gauge!("fucina_jobs_in_flight").decrement(1.0);
        if let Ok(mut ports) = self.ports.lock() {
            ports.push(self.port);
        }
    }
}

/// Bounded per-tier execution lanes with a shared front-end port pool.
///
/// The pool is sized to the total slot count, so a worker that holds a permit
/// always finds a free port: concurrent pipelines never contend for the same
/// front-end listener.
pub struct ExecutionLanes {
    standard: Arc<Semaphore>,
    accelerated: Arc<Semaphore>,
    ports: Arc<Mutex<Vec<u16>>>,
}

impl ExecutionLanes {
    pub fn new(dispatch: &DispatchSettings, base_port: u16) -> Self {
        let standard_slots = dispatch.standard_slots.get() as usize;
        let accelerated_slots = dispatch.accelerated_slots.get() as usize;
        let total = standard_slots + accelerated_slots;

        let ports = (0..total)
            .map(|offset| base_port + offset as u16)
            .collect();

        Self {
            standard: Arc::new(Semaphore::new(standard_slots)),
            accelerated: Arc::new(Semaphore::new(accelerated_slots)),
            ports: Arc::new(Mutex::new(ports)),
        }
    }

    /// Wait for a slot on the tier's lane and lease a front-end port.
    pub async fn acquire(&self, tier: ComputeTier) -> LaneSlot {
        let lane = match tier {
            ComputeTier::Standard => &self.standard,
            ComputeTier::Accelerated => &self.accelerated,
        };

        // The semaphore is never closed while the lanes are alive.
        let permit = lane
            .clone()
            .acquire_owned()
            .await
            .expect("execution lane semaphore closed");

        // Sized to the total slot count, so a permit holder always finds one.
        let port = self
            .ports
            .lock()
            .expect("port pool lock poisoned")
            .pop()
            .expect("port pool exhausted while holding a lane permit");

        metrics::gauge!("fucina_jobs_in_flight").increment(1.0);

        LaneSlot {
            port,
            ports: Arc::clone(&self.ports),
            _permit: permit,
        }
    }
}
