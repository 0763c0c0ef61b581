//! Timer facility used to drive background service ticks.
//!
//! The engine only needs "run this callback once after this delay". Anything
//! implementing [`Timer`] can be injected; [`ThreadTimer`] is the stock
//! implementation backed by one dedicated OS thread.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::core::EngineError;

/// Deadline used when `now + delay` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Callback run once by a timer.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot delayed callback scheduling.
pub trait Timer: Send + Sync {
    /// Run `callback` once, no earlier than `delay` from now.
    ///
    /// Callbacks must be short; they run on the timer's own thread(s).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Timer` if the timer no longer accepts work.
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), EngineError>;
}

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    callback: TimerCallback,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Timer backed by a single dedicated thread.
///
/// # Design
///
/// - **No polling**: the thread blocks on `recv_timeout` until the earliest
///   deadline or a new entry, whichever comes first
/// - **Clean shutdown**: dropping the sender ends the loop; pending entries
///   are discarded
pub struct ThreadTimer {
    tx: Mutex<Option<Sender<TimerEntry>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    seq: AtomicU64,
}

impl ThreadTimer {
    /// Start the timer thread.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Timer` if the thread cannot be spawned.
    pub fn new() -> Result<Self, EngineError> {
        let (tx, rx) = unbounded::<TimerEntry>();
        let worker = thread::Builder::new()
            .name("spool-timer".into())
            .spawn(move || timer_loop(&rx))
            .map_err(|e| EngineError::Timer(format!("failed to spawn timer thread: {e}")))?;
        let worker_id = worker.thread().id();
        info!("Timer thread started");
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            worker_id,
            seq: AtomicU64::new(0),
        })
    }

    /// Stop the timer thread and discard pending callbacks.
    ///
    /// Joins the thread unless called from a timer callback. Idempotent.
    pub fn shutdown(&self) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        drop(tx);
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("Timer thread panicked");
            }
        }
        info!("Timer thread stopped");
    }
}

impl Timer for ThreadTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), EngineError> {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .ok_or_else(|| EngineError::Timer(format!("delay {delay:?} out of range")))?;
        let entry = TimerEntry {
            deadline,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            callback,
        };
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(EngineError::Timer("timer is shut down".into()));
        };
        tx.send(entry)
            .map_err(|_| EngineError::Timer("timer thread is gone".into()))
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        // Signal the thread but don't join: it exits on its own once the
        // channel is disconnected.
        self.tx.lock().take();
    }
}

impl std::fmt::Debug for ThreadTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadTimer")
            .field("running", &self.tx.lock().is_some())
            .finish_non_exhaustive()
    }
}

fn timer_loop(rx: &Receiver<TimerEntry>) {
    let mut heap: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();
    loop {
        let now = Instant::now();
        while heap.peek().is_some_and(|Reverse(e)| e.deadline <= now) {
            if let Some(Reverse(entry)) = heap.pop() {
                if panic::catch_unwind(AssertUnwindSafe(entry.callback)).is_err() {
                    error!("Timer callback panicked");
                }
            }
        }

        let received = match heap.peek() {
            Some(Reverse(next)) => {
                rx.recv_timeout(next.deadline.saturating_duration_since(Instant::now()))
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(entry) => heap.push(Reverse(entry)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(discarded = heap.len(), "Timer thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn test_fires_in_deadline_order() {
        let timer = ThreadTimer::new().unwrap();
        let (tx, rx) = mpsc::channel();
        for (label, delay_ms) in [("late", 60_u64), ("early", 5), ("middle", 30)] {
            let tx = tx.clone();
            timer
                .schedule(
                    Duration::from_millis(delay_ms),
                    Box::new(move || tx.send(label).unwrap()),
                )
                .unwrap();
        }
        let timeout = Duration::from_secs(5);
        let fired: Vec<_> = (0..3).map(|_| rx.recv_timeout(timeout).unwrap()).collect();
        assert_eq!(fired, vec!["early", "middle", "late"]);
        timer.shutdown();
    }

    #[test]
    fn test_respects_delay() {
        let timer = ThreadTimer::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        timer
            .schedule(Duration::from_millis(40), Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        timer.shutdown();
    }

    #[test]
    fn test_panicking_callback_keeps_timer_alive() {
        let timer = ThreadTimer::new().unwrap();
        let (tx, rx) = mpsc::channel();
        timer
            .schedule(Duration::ZERO, Box::new(|| panic!("callback failure")))
            .unwrap();
        timer
            .schedule(Duration::from_millis(5), Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        timer.shutdown();
    }

    #[test]
    fn test_huge_delay_is_accepted() {
        let timer = ThreadTimer::new().unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        timer
            .schedule(Duration::MAX, Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
        timer.shutdown();
    }

    #[test]
    fn test_schedule_after_shutdown_fails() {
        let timer = ThreadTimer::new().unwrap();
        timer.shutdown();
        timer.shutdown();
        let result = timer.schedule(Duration::ZERO, Box::new(|| {}));
        assert!(matches!(result, Err(EngineError::Timer(_))));
    }

    #[test]
    fn test_pending_entries_dropped_on_shutdown() {
        let timer = ThreadTimer::new().unwrap();
        let fired = Arc::new(AtomicU64::new(0));
        let fired_cb = Arc::clone(&fired);
        timer
            .schedule(
                Duration::from_secs(3600),
                Box::new(move || {
                    fired_cb.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();
        timer.shutdown();
        assert_eq!(fired.load(Ordering::Relaxed), 0);
    }
}
