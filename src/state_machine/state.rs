use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::job::{JobHandle, TransitionOutcome, TransitionRecord};
use crate::error::JobError;
use crate::orchestrator::{JobCallback, JobOrchestrator};

/// Hardware readiness rank.
///
/// States are totally ordered: OFF < ENGINE < BIND < PREVIEW. A higher rank
/// implies every lower one has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CameraState {
    Off,
    Engine,
    Bind,
    Preview,
}

impl CameraState {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn is_at_least(self, other: CameraState) -> bool {
        self >= other
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Off => write!(f, "OFF"),
            CameraState::Engine => write!(f, "ENGINE"),
            CameraState::Bind => write!(f, "BIND"),
            CameraState::Preview => write!(f, "PREVIEW"),
        }
    }
}

const ADVANCE: &str = " >> ";
const RETREAT: &str = " << ";

/// Job name for a state change, e.g. `"OFF >> ENGINE"` or `"PREVIEW << BIND"`.
fn transition_name(from: CameraState, to: CameraState) -> String {
    let marker = if to < from { RETREAT } else { ADVANCE };
    format!("{from}{marker}{to}")
}

struct Slots {
    current: CameraState,
    target: CameraState,
    change_count: u64,
    history: Vec<TransitionRecord>,
}

fn lock(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves the target back onto the current state when dropped, unless a newer
/// change was requested meanwhile. It travels inside the job, so a change that
/// is trimmed, removed or reset before running resets the target too.
struct TargetReset {
    slots: Arc<Mutex<Slots>>,
    change_count: u64,
}

impl Drop for TargetReset {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        if slots.change_count == self.change_count {
            slots.target = slots.current;
        }
    }
}

/// A [`JobOrchestrator`] whose jobs are gated by the camera's [`CameraState`].
///
/// The current state only changes inside a state-change job, and only one job
/// runs at a time, so every job observes a consistent state.
#[derive(Clone)]
pub struct StateOrchestrator {
    jobs: JobOrchestrator,
    slots: Arc<Mutex<Slots>>,
}

impl StateOrchestrator {
    pub fn new(callback: Arc<dyn JobCallback>) -> Self {
        Self {
            jobs: JobOrchestrator::new(callback),
            slots: Arc::new(Mutex::new(Slots {
                current: CameraState::Off,
                target: CameraState::Off,
                change_count: 0,
                history: Vec::new(),
            })),
        }
    }

    /// The underlying queue, for plain scheduling, trimming and resetting.
    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    pub fn current_state(&self) -> CameraState {
        lock(&self.slots).current
    }

    /// The last requested state, or the current one once no change is in flight.
    pub fn target_state(&self) -> CameraState {
        lock(&self.slots).target
    }

    /// Audit trail of every state-change job that has run.
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        lock(&self.slots).history.clone()
    }

    /// Whether a state change is queued or executing.
    pub fn has_pending_state_change(&self) -> bool {
        self.jobs
            .any_job(|name| name.contains(ADVANCE) || name.contains(RETREAT))
    }

    /// Schedules a change from `from` to `to`.
    ///
    /// When the job runs and the current state is not `from`, it resolves as
    /// [`JobError::Cancelled`] without touching the state. Otherwise `change`
    /// runs; an advancing change is applied only if it succeeds, while a
    /// retreating one is applied whatever its outcome, a panic included.
    /// The target goes back to the current state once the job resolves or is
    /// dropped from the queue, unless a newer change was requested meanwhile.
    pub fn schedule_state_change<T, F, Fut>(
        &self,
        from: CameraState,
        to: CameraState,
        dispatch_exceptions: bool,
        change: F,
    ) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, JobError>> + Send + 'static,
    {
        let change_count = {
            let mut slots = lock(&self.slots);
            slots.change_count += 1;
            slots.target = to;
            slots.change_count
        };
        let name = transition_name(from, to);
        let teardown = to < from;
        let reset = TargetReset {
            slots: Arc::clone(&self.slots),
            change_count,
        };
        let slots = Arc::clone(&self.slots);
        let job_name = name.clone();

        self.jobs
            .schedule_generic(&name, dispatch_exceptions, Duration::ZERO, move || async move {
                let started_at = Utc::now();
                let current = lock(&slots).current;
                let (result, outcome) = if current != from {
                    warn!(job = %job_name, %current, "state changed before job ran");
                    (Err(JobError::Cancelled), TransitionOutcome::Stale)
                } else {
                    // A panicking change still counts as an outcome of the change.
                    let result = match std::panic::catch_unwind(AssertUnwindSafe(change)) {
                        Ok(pending) => AssertUnwindSafe(pending)
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| Err(JobError::from_panic(panic))),
                        Err(panic) => Err(JobError::from_panic(panic)),
                    };
                    let outcome = match &result {
                        Ok(_) => TransitionOutcome::Applied,
                        Err(_) if teardown => TransitionOutcome::Applied,
                        Err(err) => TransitionOutcome::Failed(err.to_string()),
                    };
                    (result, outcome)
                };

                {
                    let mut slots = lock(&slots);
                    if outcome == TransitionOutcome::Applied {
                        slots.current = to;
                        debug!(job = %job_name, state = %to, "state applied");
                    }
                    slots
                        .history
                        .push(TransitionRecord::new(from, to, outcome, started_at));
                }
                drop(reset);
                result
            })
    }

    /// Schedules `job` to run only if the state is at least `at_least` by then.
    /// Below that rank the job is skipped and resolves successfully.
    pub fn schedule_stateful<F, Fut>(
        &self,
        name: &str,
        at_least: CameraState,
        job: F,
    ) -> JobHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.schedule_stateful_delayed(name, at_least, Duration::ZERO, job)
    }

    pub fn schedule_stateful_delayed<F, Fut>(
        &self,
        name: &str,
        at_least: CameraState,
        min_delay: Duration,
        job: F,
    ) -> JobHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let job_name = name.to_string();
        self.jobs
            .schedule_generic(name, true, min_delay, move || async move {
                let current = lock(&slots).current;
                if current.is_at_least(at_least) {
                    job().await
                } else {
                    debug!(job = %job_name, %current, required = %at_least, "stateful job skipped");
                    Ok(())
                }
            })
    }
}
