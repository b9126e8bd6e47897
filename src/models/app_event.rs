use rusqlite::{params, Connection, Result, Row};
use serde::Serialize;

/// One application usage session, from first sighting to disappearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppEvent {
    pub id: Option<i64>,
    pub process_name: String,
    pub pid: u32,
    pub parent_process_name: Option<String>,
    pub exe_path: Option<String>,
    pub start_time: i64,
    pub end_time: Option<i64>,
}

const COLUMNS: &str = "id, process_name, pid, parent_process_name, exe_path, start_time, end_time";

impl AppEvent {
    pub fn new(
        process_name: &str,
        pid: u32,
        parent_process_name: Option<&str>,
        exe_path: Option<&str>,
        start_time: i64,
    ) -> Self {
        Self {
            id: None,
            process_name: process_name.to_string(),
            pid,
            parent_process_name: parent_process_name.map(str::to_string),
            exe_path: exe_path.map(str::to_string),
            start_time,
            end_time: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            process_name: row.get(1)?,
            pid: row.get(2)?,
            parent_process_name: row.get(3)?,
            exe_path: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
        })
    }

    /// Insert directly, bypassing the write queue.
    ///
    /// The monitor never calls this; production inserts go through
    /// `WriteRequest::insert_event` so they stay ordered with closes.
    pub fn save(&mut self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO app_events (process_name, pid, parent_process_name, exe_path, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.process_name,
                self.pid,
                self.parent_process_name,
                self.exe_path,
                self.start_time,
                self.end_time,
            ],
        )?;
        self.id = Some(conn.last_insert_rowid());
        Ok(())
    }

    /// Sessions that have not ended yet, oldest first.
    pub fn find_open(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM app_events WHERE end_time IS NULL ORDER BY start_time, id"
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }

    /// Sessions that started in `[start, end)`.
    pub fn find_in_range(conn: &Connection, start: i64, end: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM app_events WHERE start_time >= ?1 AND start_time < ?2 ORDER BY start_time, id"
        ))?;
        let rows = stmt.query_map(params![start, end], Self::from_row)?;
        rows.collect()
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).max(0))
    }
}
