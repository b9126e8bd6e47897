use crate::constants::{
    MAX_POLL_INTERVAL_MS, MAX_QUEUE_CAPACITY, MAX_WINDOW_GRACE_SECS, MIN_POLL_INTERVAL_MS,
};
use crate::error::MonitorError;

/// Validate the census poll interval in milliseconds.
pub fn validate_poll_interval(interval_ms: u64) -> Result<(), MonitorError> {
    if interval_ms < MIN_POLL_INTERVAL_MS {
        return Err(MonitorError::InvalidConfig {
            field: "poll_interval_ms",
            reason: format!("must be at least {MIN_POLL_INTERVAL_MS} ms"),
        });
    }
    if interval_ms > MAX_POLL_INTERVAL_MS {
        return Err(MonitorError::InvalidConfig {
            field: "poll_interval_ms",
            reason: format!("cannot exceed {MAX_POLL_INTERVAL_MS} ms"),
        });
    }
    Ok(())
}

/// Validate the write queue capacity.
pub fn validate_queue_capacity(capacity: usize) -> Result<(), MonitorError> {
    if capacity == 0 {
        return Err(MonitorError::InvalidConfig {
            field: "queue_capacity",
            reason: "must be positive".into(),
        });
    }
    if capacity > MAX_QUEUE_CAPACITY {
        return Err(MonitorError::InvalidConfig {
            field: "queue_capacity",
            reason: format!("cannot exceed {MAX_QUEUE_CAPACITY}"),
        });
    }
    Ok(())
}

/// Validate the visible-window grace period in seconds.
pub fn validate_window_grace(grace_secs: u64) -> Result<(), MonitorError> {
    if grace_secs > MAX_WINDOW_GRACE_SECS {
        return Err(MonitorError::InvalidConfig {
            field: "window_grace_secs",
            reason: "cannot exceed 24 hours".into(),
        });
    }
    Ok(())
}
