use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// Control input for the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Forget every tracked process; running applications are logged
    /// again on the next tick.
    Reset,
    /// Wake the loop so it notices it has been stopped.
    Stop,
}

/// At most one reset and one stop can be pending at a time.
const SIGNAL_SLOTS: usize = 2;

/// Posts reset requests to a running monitor.
///
/// A single reset can be pending. Posting while one is already pending
/// does nothing, so a burst of resets collapses into one. A pending stop
/// never absorbs a reset.
#[derive(Debug, Clone)]
pub struct ResetHandle {
    tx: SyncSender<Signal>,
    reset_pending: Arc<AtomicBool>,
}

/// Loop side of the signal channel.
#[derive(Debug)]
pub(crate) struct SignalReceiver {
    rx: Receiver<Signal>,
    reset_pending: Arc<AtomicBool>,
}

pub(crate) fn signal_channel() -> (ResetHandle, SignalReceiver) {
    let (tx, rx) = mpsc::sync_channel(SIGNAL_SLOTS);
    let reset_pending = Arc::new(AtomicBool::new(false));
    (
        ResetHandle {
            tx,
            reset_pending: Arc::clone(&reset_pending),
        },
        SignalReceiver { rx, reset_pending },
    )
}

impl ResetHandle {
    /// Request that tracking state be cleared. Never blocks.
    ///
    /// Returns true if this call posted a new signal, false if it was
    /// coalesced with a pending one or the monitor is gone.
    pub fn reset(&self) -> bool {
        if self.reset_pending.swap(true, Ordering::AcqRel) {
            log::debug!("Reset already pending, coalesced");
            return false;
        }
        let posted = self.post(Signal::Reset);
        if !posted {
            self.reset_pending.store(false, Ordering::Release);
        }
        posted
    }

    /// Wake the loop after its running flag has been cleared.
    pub(crate) fn stop(&self) {
        self.post(Signal::Stop);
    }

    fn post(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Only repeated stops fill both slots; the loop is exiting.
                log::debug!("Signal channel full, {signal:?} dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Monitor loop has exited, {signal:?} ignored");
                false
            }
        }
    }
}

impl SignalReceiver {
    /// Wait up to `timeout` for a signal. A received reset frees the slot
    /// for the next one.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Signal, RecvTimeoutError> {
        let signal = self.rx.recv_timeout(timeout)?;
        if signal == Signal::Reset {
            self.reset_pending.store(false, Ordering::Release);
        }
        Ok(signal)
    }
}
