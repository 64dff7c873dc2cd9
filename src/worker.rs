//! FIFO task executor that jobs are dispatched onto.
//!
//! A [`Worker`] drains an unbounded channel from a single tokio task, so tasks
//! posted to the same worker run one after another in posting order. Futures
//! handed to [`Worker::spawn`] run on the same runtime but do not occupy the
//! queue while they wait.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::JobError;

type Task = Box<dyn FnOnce() + Send>;

#[derive(Clone)]
pub struct Worker {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Task>,
    runtime: Handle,
}

impl Worker {
    /// Creates a worker on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(name: &str) -> Self {
        Self::with_handle(name, Handle::current())
    }

    pub fn with_handle(name: &str, runtime: Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let name: Arc<str> = Arc::from(name);
        let loop_name = Arc::clone(&name);
        runtime.spawn(async move {
            while let Some(task) = rx.recv().await {
                // A panicking task must not take the queue down with it.
                if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
                    let err = JobError::from_panic(panic);
                    error!(worker = %loop_name, error = %err, "worker task panicked");
                }
            }
            trace!(worker = %loop_name, "worker drained");
        });
        Self { name, tx, runtime }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `task` behind everything already posted.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(task)).is_err() {
            trace!(worker = %self.name, "worker closed, task dropped");
        }
    }

    /// Queues `task` once `delay` has elapsed.
    pub fn post_delayed(&self, delay: Duration, task: impl FnOnce() + Send + 'static) {
        if delay.is_zero() {
            self.post(task);
            return;
        }
        let worker = self.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            worker.post(task);
        });
    }

    /// Runs `future` on the worker's runtime without blocking the task queue.
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(future);
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("name", &self.name).finish()
    }
}
