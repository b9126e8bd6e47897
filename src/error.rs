use thiserror::Error;

/// Errors raised inside the monitor core.
///
/// None of these reach a caller synchronously; the monitor loop and the
/// writer thread log them and carry on with the next tick or request.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Process enumeration failed: {0}")]
    Enumeration(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Failed to read config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Monitor has already been started")]
    AlreadyStarted,
}

/// Errors from an OS capability query. Each query fails independently.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Not supported on this platform")]
    Unsupported,

    #[error("Process {pid} not found")]
    NotFound { pid: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("X11 error: {0}")]
    X11(String),
}

/// Daemon start-up failures.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Could not determine project directories")]
    NoProjectDirs,

    #[error("Could not create data directory: {0}")]
    DataDirCreation(std::io::Error),

    #[error("Failed to open database: {0}")]
    DatabaseOpen(rusqlite::Error),

    #[error("Failed to run database migrations: {0}")]
    Migration(rusqlite::Error),

    #[error("Failed to load configuration: {0}")]
    Config(MonitorError),

    #[error("Failed to start monitor: {0}")]
    Monitor(MonitorError),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Check if a rusqlite error is a UNIQUE constraint violation
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _)
        if err.code == rusqlite::ffi::ErrorCode::ConstraintViolation)
}
