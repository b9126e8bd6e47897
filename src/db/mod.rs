pub mod migrations;
pub mod schema;

use crate::constants::BUSY_TIMEOUT_MS;
use rusqlite::{Connection, Result};
use std::path::Path;
use std::time::Duration;

/// One SQLite connection to the events store.
///
/// The writer thread and the monitor's seeding read each hold their own
/// `Database`. WAL mode lets the external reader query while the single
/// writer commits.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
