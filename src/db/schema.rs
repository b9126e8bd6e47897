/// Layout of the persisted application sessions.
///
/// `app_events` is the contract shared with the external reporting layer:
/// a row with `end_time IS NULL` means the application is still running.
/// Times are epoch seconds.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS app_events (
    id INTEGER PRIMARY KEY,
    process_name TEXT NOT NULL,
    pid INTEGER NOT NULL,
    parent_process_name TEXT,
    exe_path TEXT,
    start_time INTEGER NOT NULL,
    end_time INTEGER
);

CREATE INDEX IF NOT EXISTS idx_app_events_start_time ON app_events(start_time);
CREATE UNIQUE INDEX IF NOT EXISTS idx_app_events_open_pid ON app_events(pid) WHERE end_time IS NULL;
"#;
