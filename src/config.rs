//! Engine configuration loaded from `camctl.toml`.
//!
//! Every field of [`EngineConfig`] has a default, so a partial or missing
//! file is fine. `CAMCTL_LOCK_TIMEOUT_MS` takes precedence over the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CameraError;

pub const DEFAULT_CONFIG_FILE: &str = "camctl.toml";
const LOCK_TIMEOUT_ENV: &str = "CAMCTL_LOCK_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a 3A lock before it is abandoned.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Weight of the main region produced by a metering touch.
    #[serde(default = "default_metering_weight")]
    pub metering_weight: i32,

    /// Whether a metering touch also adds a lighter background region.
    #[serde(default = "default_blur_metering")]
    pub blur_metering: bool,

    /// Name of the worker executing camera jobs.
    #[serde(default = "default_worker_name")]
    pub worker_name: String,
}

fn default_lock_timeout_ms() -> u64 {
    2500
}

fn default_metering_weight() -> i32 {
    1000
}

fn default_blur_metering() -> bool {
    true
}

fn default_worker_name() -> String {
    "camera".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            metering_weight: default_metering_weight(),
            blur_metering: default_blur_metering(),
            worker_name: default_worker_name(),
        }
    }
}

impl EngineConfig {
    /// Loads `camctl.toml` from the working directory.
    pub fn load() -> Result<Self, CameraError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, CameraError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<EngineConfig>(&contents)?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(value) = std::env::var(LOCK_TIMEOUT_ENV)
            && !value.is_empty()
        {
            config.lock_timeout_ms = value
                .parse()
                .map_err(|_| CameraError::Config(format!("{LOCK_TIMEOUT_ENV}={value} is not a number")))?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CameraError> {
        if !(0..=1000).contains(&self.metering_weight) {
            return Err(CameraError::Config(format!(
                "metering_weight must be within 0..=1000, got {}",
                self.metering_weight
            )));
        }
        if self.worker_name.trim().is_empty() {
            return Err(CameraError::Config("worker_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
