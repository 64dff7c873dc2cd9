//! Single-flight job queue.
//!
//! [`JobOrchestrator`] keeps every scheduled job in one pending list guarded by
//! a mutex. After each enqueue and each completion a sync step picks the first
//! eligible job (earliest start time, then enqueue order) and, if nothing else
//! is running, posts it to the worker chosen by [`JobCallback::worker`]. The
//! job body, and the worker dispatch itself, always run with the queue lock
//! released, so jobs may schedule more jobs.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::JobError;
use crate::state_machine::JobHandle;
use crate::worker::Worker;

/// Hooks supplied by the owner of an orchestrator.
pub trait JobCallback: Send + Sync + 'static {
    /// Worker that should execute the job named `job_name`.
    fn worker(&self, job_name: &str) -> Worker;

    /// Called for failed jobs scheduled with `dispatch_exceptions`.
    fn on_job_exception(&self, job_name: &str, error: &JobError);
}

/// Delivers a finished job's typed result to its handle.
type Settle = Box<dyn FnOnce() + Send>;
type ErasedJob = Box<dyn FnOnce() -> BoxFuture<'static, (Option<JobError>, Settle)> + Send>;

struct PendingJob {
    id: u64,
    name: String,
    dispatch_exceptions: bool,
    start_time: Instant,
    run: ErasedJob,
}

struct RunningJob {
    id: u64,
    name: String,
}

#[derive(Default)]
struct Queue {
    pending: Vec<PendingJob>,
    running: Option<RunningJob>,
    next_id: u64,
}

struct Inner {
    callback: Arc<dyn JobCallback>,
    queue: Mutex<Queue>,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(callback: Arc<dyn JobCallback>) -> Self {
        Self {
            inner: Arc::new(Inner {
                callback,
                queue: Mutex::new(Queue::default()),
            }),
        }
    }

    /// Schedules a synchronous job.
    pub fn schedule<F>(&self, name: &str, dispatch_exceptions: bool, job: F) -> JobHandle<()>
    where
        F: FnOnce() -> Result<(), JobError> + Send + 'static,
    {
        self.schedule_delayed(name, dispatch_exceptions, Duration::ZERO, job)
    }

    /// Schedules a synchronous job that may not start before `min_delay` has elapsed.
    pub fn schedule_delayed<F>(
        &self,
        name: &str,
        dispatch_exceptions: bool,
        min_delay: Duration,
        job: F,
    ) -> JobHandle<()>
    where
        F: FnOnce() -> Result<(), JobError> + Send + 'static,
    {
        self.schedule_generic(name, dispatch_exceptions, min_delay, move || {
            future::ready(job())
        })
    }

    /// Schedules a job whose result is itself asynchronous.
    ///
    /// `scheduler` runs on the worker; the future it returns is driven off the
    /// worker and the next job only starts once it resolves.
    pub fn schedule_generic<T, F, Fut>(
        &self,
        name: &str,
        dispatch_exceptions: bool,
        min_delay: Duration,
        scheduler: F,
    ) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, JobError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let run: ErasedJob = Box::new(move || {
            let pending: BoxFuture<'static, Result<T, JobError>> =
                match std::panic::catch_unwind(AssertUnwindSafe(scheduler)) {
                    Ok(fut) => fut.boxed(),
                    Err(panic) => future::ready(Err(JobError::from_panic(panic))).boxed(),
                };
            async move {
                let result = match AssertUnwindSafe(pending).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(JobError::from_panic(panic)),
                };
                let error = result.as_ref().err().cloned();
                let settle: Settle = Box::new(move || {
                    // The caller may have dropped or cancelled its handle.
                    let _ = tx.send(result);
                });
                (error, settle)
            }
            .boxed()
        });

        let start_time = Instant::now() + min_delay;
        {
            let mut queue = self.inner.lock();
            let id = queue.next_id;
            queue.next_id += 1;
            queue.pending.push(PendingJob {
                id,
                name: name.to_string(),
                dispatch_exceptions,
                start_time,
                run,
            });
        }
        debug!(job = name, delay_ms = min_delay.as_millis() as u64, "job scheduled");
        self.inner.post_sync(name, min_delay);
        JobHandle::new(name, rx)
    }

    /// Drops every pending job named `name`.
    pub fn remove(&self, name: &str) {
        self.trim(name, 0);
    }

    /// Drops the oldest pending jobs named `name` until at most `allowed` remain.
    ///
    /// A job that already started is left alone.
    pub fn trim(&self, name: &str, allowed: usize) {
        let removed: Vec<PendingJob> = {
            let mut queue = self.inner.lock();
            let mut matching: Vec<u64> = queue
                .pending
                .iter()
                .filter(|job| job.name == name)
                .map(|job| job.id)
                .collect();
            matching.sort_unstable();
            let excess = matching.len().saturating_sub(allowed);
            matching.truncate(excess);
            if matching.is_empty() {
                return;
            }
            let (removed, kept) = std::mem::take(&mut queue.pending)
                .into_iter()
                .partition(|job| matching.contains(&job.id));
            queue.pending = kept;
            removed
        };
        debug!(job = name, removed = removed.len(), allowed, "pending jobs trimmed");
        // Dropping the jobs drops their result senders, cancelling the handles.
        drop(removed);
    }

    /// Drops every pending job.
    pub fn reset(&self) {
        let removed = std::mem::take(&mut self.inner.lock().pending);
        if !removed.is_empty() {
            debug!(removed = removed.len(), "job queue reset");
        }
        drop(removed);
    }

    /// Number of jobs waiting to run, not counting the running one.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Name of the job currently executing, if any.
    pub fn running_job(&self) -> Option<String> {
        self.inner.lock().running.as_ref().map(|job| job.name.clone())
    }

    /// Whether any unresolved job, pending or running, has a name matching `predicate`.
    pub(crate) fn any_job(&self, predicate: impl Fn(&str) -> bool) -> bool {
        let queue = self.inner.lock();
        queue.running.as_ref().is_some_and(|job| predicate(&job.name))
            || queue.pending.iter().any(|job| predicate(&job.name))
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post_sync(self: &Arc<Self>, name: &str, delay: Duration) {
        let worker = self.callback.worker(name);
        let inner = Arc::clone(self);
        worker.post_delayed(delay, move || inner.sync());
    }

    fn sync(self: &Arc<Self>) {
        let job = {
            let mut queue = self.lock();
            if queue.running.is_some() {
                return;
            }
            let now = Instant::now();
            let next = queue
                .pending
                .iter()
                .enumerate()
                .filter(|(_, job)| job.start_time <= now)
                .min_by_key(|(_, job)| (job.start_time, job.id))
                .map(|(index, _)| index);
            let Some(index) = next else {
                return;
            };
            let job = queue.pending.remove(index);
            queue.running = Some(RunningJob {
                id: job.id,
                name: job.name.clone(),
            });
            job
        };
        let worker = self.callback.worker(&job.name);
        let inner = Arc::clone(self);
        let executor = worker.clone();
        worker.post(move || inner.execute(job, executor));
    }

    fn execute(self: Arc<Self>, job: PendingJob, worker: Worker) {
        let PendingJob {
            id,
            name,
            dispatch_exceptions,
            run,
            ..
        } = job;
        trace!(job = %name, worker = worker.name(), "job executing");
        let pending = run();
        let completion = worker.clone();
        worker.spawn(async move {
            let (error, settle) = pending.await;
            completion.post(move || self.finish(id, &name, dispatch_exceptions, error, settle));
        });
    }

    fn finish(
        self: Arc<Self>,
        id: u64,
        name: &str,
        dispatch_exceptions: bool,
        error: Option<JobError>,
        settle: Settle,
    ) {
        {
            let mut queue = self.lock();
            if queue.running.as_ref().is_some_and(|job| job.id == id) {
                queue.running = None;
            }
        }
        match &error {
            None => debug!(job = name, "job completed"),
            Some(err) if err.is_cancelled() => debug!(job = name, "job cancelled"),
            Some(err) => {
                warn!(job = name, error = %err, "job failed");
                if dispatch_exceptions {
                    let callback = AssertUnwindSafe(|| self.callback.on_job_exception(name, err));
                    if let Err(panic) = std::panic::catch_unwind(callback) {
                        let panic = JobError::from_panic(panic);
                        warn!(job = name, error = %panic, "exception callback panicked");
                    }
                }
            }
        }
        settle();
        self.sync();
    }
}
