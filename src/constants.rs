// src/constants.rs

/// Default time between two process census ticks (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Shortest poll interval accepted from configuration (milliseconds)
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Longest poll interval accepted from configuration (one hour)
pub const MAX_POLL_INTERVAL_MS: u64 = 60 * 60 * 1_000;

/// Default number of buffered write requests before enqueue blocks
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Maximum write queue capacity
pub const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Seconds a freshly started process may go without a visible window
/// before it is excluded for its lifetime
pub const DEFAULT_WINDOW_GRACE_SECS: u64 = 10;

/// Maximum window grace period (one day)
pub const MAX_WINDOW_GRACE_SECS: u64 = 86_400;

/// SQLite busy timeout for both the writer and readers (milliseconds)
pub const BUSY_TIMEOUT_MS: u64 = 5_000;

/// File name of the events database inside the data directory
pub const DB_FILE_NAME: &str = "appcensus.db";

/// File name of the optional JSON config inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Slack allowed between two readings of one process's start time before
/// the pid is considered reused by a different process (seconds)
pub const START_TIME_TOLERANCE_SECS: u64 = 2;
