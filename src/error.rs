use std::any::Any;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Invalid angle: {0}. Angles must be one of 0, 90, 180, 270")]
    InvalidAngle(i32),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failure of a scheduled job, as seen by whoever awaits its handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job was removed before running, superseded by a newer state change,
    /// or its result was abandoned.
    #[error("job cancelled")]
    Cancelled,

    /// The job body or the hardware it drove reported an error.
    #[error("hardware rejected job: {0}")]
    Rejected(String),

    /// The job body panicked.
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic payload".to_string()
        };
        JobError::Panicked(message)
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Rejected(format!("{err:#}"))
    }
}
