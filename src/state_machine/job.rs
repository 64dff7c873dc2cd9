use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::state::CameraState;
use crate::error::JobError;

/// Future side of a scheduled job.
///
/// Resolves with the job's own result once it has run. A job that is trimmed,
/// removed or reset before running resolves with [`JobError::Cancelled`], as
/// does a handle on which [`JobHandle::cancel`] was called before completion.
#[derive(Debug)]
pub struct JobHandle<T> {
    name: String,
    rx: oneshot::Receiver<Result<T, JobError>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(name: &str, rx: oneshot::Receiver<Result<T, JobError>>) -> Self {
        Self {
            name: name.to_string(),
            rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abandons the result. A job already executing keeps running; only its
    /// outcome is dropped.
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, JobError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(JobError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// How an executed state-change job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionOutcome {
    /// The current state was moved to the target.
    Applied,
    /// The baseline no longer matched; nothing was done.
    Stale,
    /// The hardware reported an error and the state was left untouched.
    Failed(String),
}

/// Audit entry produced each time a state-change job runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: CameraState,
    pub to: CameraState,
    pub outcome: TransitionOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl TransitionRecord {
    pub(crate) fn new(
        from: CameraState,
        to: CameraState,
        outcome: TransitionOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            from,
            to,
            outcome,
            started_at,
            completed_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
        }
    }
}
