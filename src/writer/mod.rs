//! Single-writer persistence queue.
//!
//! Every mutation of `app_events` goes through one bounded channel and is
//! executed by one dedicated thread, in the order it was enqueued.

use crate::error::is_unique_violation;
use crate::models::AppEvent;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const INSERT_EVENT: &str = "INSERT INTO app_events (process_name, pid, parent_process_name, exe_path, start_time)
     VALUES (?1, ?2, ?3, ?4, ?5)";

const CLOSE_EVENT: &str = "UPDATE app_events SET end_time = ?1 WHERE pid = ?2 AND end_time IS NULL";

/// A queued statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub statement: &'static str,
    pub params: Vec<Value>,
}

impl WriteRequest {
    /// Open a session row for `event`. Its `end_time` is ignored.
    pub fn insert_event(event: &AppEvent) -> Self {
        Self {
            statement: INSERT_EVENT,
            params: vec![
                Value::from(event.process_name.clone()),
                Value::from(event.pid),
                Value::from(event.parent_process_name.clone()),
                Value::from(event.exe_path.clone()),
                Value::from(event.start_time),
            ],
        }
    }

    /// Close whichever session row is still open for `pid`.
    pub fn close_event(pid: u32, end_time: i64) -> Self {
        Self {
            statement: CLOSE_EVENT,
            params: vec![Value::from(end_time), Value::from(pid)],
        }
    }

    pub fn is_insert(&self) -> bool {
        self.statement == INSERT_EVENT
    }

    pub fn is_close(&self) -> bool {
        self.statement == CLOSE_EVENT
    }

    /// The pid this request touches. Both statements bind it second.
    pub fn pid(&self) -> Option<u32> {
        if !self.is_insert() && !self.is_close() {
            return None;
        }
        if let Value::Integer(pid) = self.params.get(1)? {
            u32::try_from(*pid).ok()
        } else {
            None
        }
    }
}

/// Counters maintained by the writer thread.
#[derive(Debug, Default)]
pub struct WriterStats {
    executed: AtomicU64,
    failed: AtomicU64,
}

impl WriterStats {
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Producer side of the write queue.
///
/// Clones share the same channel. The writer thread exits once every
/// clone has been dropped and the buffer is drained.
#[derive(Clone)]
pub struct WriteQueue {
    tx: SyncSender<WriteRequest>,
    stats: Arc<WriterStats>,
}

impl WriteQueue {
    /// Spawn the writer thread, handing it exclusive ownership of `conn`.
    pub fn start(conn: Connection, capacity: usize) -> std::io::Result<(Self, JoinHandle<()>)> {
        let (tx, rx) = mpsc::sync_channel::<WriteRequest>(capacity);
        let stats = Arc::new(WriterStats::default());
        let writer_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("appcensus-writer".into())
            .spawn(move || {
                drain(&conn, &rx, &writer_stats);
                log::debug!("Write queue closed, writer thread exiting");
            })?;

        Ok((Self { tx, stats }, handle))
    }

    /// Queue a write. Blocks while the buffer is full.
    ///
    /// Returns false if the writer thread is gone; the request is lost.
    pub fn enqueue(&self, request: WriteRequest) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(mpsc::SendError(request)) => {
                log::error!(
                    "Writer thread has stopped, dropping write for pid {:?}",
                    request.pid()
                );
                false
            }
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

fn drain(conn: &Connection, rx: &Receiver<WriteRequest>, stats: &WriterStats) {
    for request in rx {
        match conn.execute(request.statement, params_from_iter(request.params.iter())) {
            Ok(_) => {
                stats.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                if is_unique_violation(&e) {
                    log::error!(
                        "Dropped write: pid {:?} already has an open session",
                        request.pid()
                    );
                } else {
                    log::error!("Dropped write for pid {:?}: {e}", request.pid());
                }
            }
        }
    }
}
