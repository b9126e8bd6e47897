pub mod ledger;
pub mod reset;
pub mod snapshot;

pub use ledger::{EntryState, Ledger, TrackedProcess};
pub use reset::{ResetHandle, Signal};
pub use snapshot::{ProcessInfo, ProcessSnapshot, ProcessSource, SysinfoSource};

use crate::config::MonitorConfig;
use crate::db::Database;
use crate::error::MonitorError;
use crate::filter::{Classifier, FilterRules};
use crate::models::AppEvent;
use crate::platform::CapabilityProvider;
use crate::writer::WriteQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Lock a mutex, recovering from poisoning if necessary
fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_secs()).ok())
        .unwrap_or(0)
}

/// Everything the loop thread takes ownership of on start.
struct MonitorLoop {
    reader: Database,
    queue: WriteQueue,
    provider: Box<dyn CapabilityProvider>,
    source: Box<dyn ProcessSource>,
    classifier: Classifier,
    signals: reset::SignalReceiver,
    poll_interval: Duration,
}

/// Periodic process census.
///
/// Owns the tick loop thread. The ledger sits behind a mutex so start-up
/// seeding, resets and tests can inspect it; only the loop mutates it.
pub struct MonitorService {
    running: Arc<AtomicBool>,
    ledger: Arc<Mutex<Ledger>>,
    signal_tx: ResetHandle,
    parts: Option<MonitorLoop>,
}

impl MonitorService {
    /// `reader` is used only for start-up seeding; every write goes
    /// through `queue`.
    pub fn new(
        reader: Database,
        queue: WriteQueue,
        provider: Box<dyn CapabilityProvider>,
        source: Box<dyn ProcessSource>,
        rules: FilterRules,
        config: &MonitorConfig,
    ) -> Self {
        let (signal_tx, signals) = reset::signal_channel();

        Self {
            running: Arc::new(AtomicBool::new(false)),
            ledger: Arc::new(Mutex::new(Ledger::new())),
            signal_tx,
            parts: Some(MonitorLoop {
                reader,
                queue,
                provider,
                source,
                classifier: Classifier::new(rules, config.window_grace_secs),
                signals,
                poll_interval: config.poll_interval(),
            }),
        }
    }

    /// Spawn the loop thread. It seeds the ledger, then ticks until
    /// [`stop`](Self::stop) is called.
    pub fn start(&mut self) -> Result<thread::JoinHandle<()>, MonitorError> {
        let mut parts = self.parts.take().ok_or(MonitorError::AlreadyStarted)?;
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let ledger = Arc::clone(&self.ledger);

        let spawned = thread::Builder::new()
            .name("appcensus-monitor".into())
            .spawn(move || {
                parts.seed(&ledger);
                parts.run(&ledger, &running);
                log::info!("Monitor loop stopped");
            });

        spawned.map_err(|e| {
            self.running.store(false, Ordering::SeqCst);
            MonitorError::Io(e)
        })
    }

    /// Ask the loop to exit. It wakes immediately, handling a pending
    /// reset first if there is one.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.signal_tx.stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn reset_handle(&self) -> ResetHandle {
        self.signal_tx.clone()
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }
}

impl MonitorLoop {
    fn seed(&mut self, ledger: &Mutex<Ledger>) {
        let open_rows = match AppEvent::find_open(self.reader.connection()) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Could not read open sessions, starting with an empty ledger: {e}");
                return;
            }
        };
        if open_rows.is_empty() {
            return;
        }

        let snapshot = self.source.snapshot();
        let now = current_timestamp();
        let mut ledger = safe_lock(ledger, "Ledger");

        match snapshot {
            Ok(snapshot) => {
                for request in ledger.seed(&open_rows, &snapshot, now) {
                    self.queue.enqueue(request);
                }
                log::info!(
                    "Resumed {} of {} open sessions",
                    ledger.len(),
                    open_rows.len()
                );
            }
            Err(e) => {
                log::warn!("Process enumeration failed during start-up ({e}); open sessions close once their pid is gone");
                ledger.adopt_orphans(&open_rows);
            }
        }
    }

    fn run(&mut self, ledger: &Mutex<Ledger>, running: &AtomicBool) {
        let mut next_tick = Instant::now();

        while running.load(Ordering::SeqCst) {
            let wait = next_tick.saturating_duration_since(Instant::now());
            let signal = match self.signals.recv_timeout(wait) {
                Ok(signal) => Some(signal),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(wait);
                    None
                }
            };

            match signal {
                Some(Signal::Reset) => {
                    safe_lock(ledger, "Ledger").clear();
                    log::info!("Tracking state cleared, running applications will be logged again");
                }
                Some(Signal::Stop) => {}
                None => {
                    self.tick(ledger);
                    next_tick += self.poll_interval;
                    let now = Instant::now();
                    if next_tick < now {
                        // Fell behind; do not fire a burst of catch-up ticks.
                        next_tick = now + self.poll_interval;
                    }
                }
            }
        }
    }

    fn tick(&mut self, ledger: &Mutex<Ledger>) {
        self.provider.refresh();

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Skipping tick: {e}");
                return;
            }
        };

        let now = current_timestamp();
        let mut ledger = safe_lock(ledger, "Ledger");
        let writes = ledger.apply_tick(&snapshot, &self.classifier, self.provider.as_ref(), now);
        // Enqueue under the lock so a reset cannot slip between the diff
        // and its writes.
        for request in writes {
            self.queue.enqueue(request);
        }
    }
}
