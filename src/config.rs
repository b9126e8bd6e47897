use crate::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_WINDOW_GRACE_SECS};
use crate::error::MonitorError;
use crate::validation::{validate_poll_interval, validate_queue_capacity, validate_window_grace};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime settings for the census monitor.
///
/// Every field is optional in `config.json`; missing fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub queue_capacity: usize,
    pub window_grace_secs: u64,
    /// Overrides the database location under the platform data directory.
    pub db_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            window_grace_secs: DEFAULT_WINDOW_GRACE_SECS,
            db_path: None,
        }
    }
}

impl MonitorConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(MonitorError::Io(e)),
        };

        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        validate_poll_interval(self.poll_interval_ms)?;
        validate_queue_capacity(self.queue_capacity)?;
        validate_window_grace(self.window_grace_secs)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
