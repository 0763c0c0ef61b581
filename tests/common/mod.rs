//! Shared test doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use spoolkit::runtime::{Timer, TimerCallback};
use spoolkit::EngineError;

/// Timer that never fires on its own; tests fire entries explicitly.
#[derive(Default)]
pub struct ManualTimer {
    entries: Mutex<VecDeque<(Duration, TimerCallback)>>,
    added: Condvar,
}

impl ManualTimer {
    /// Block until at least one entry is armed and return the oldest delay.
    pub fn wait_for_entry(&self) -> Duration {
        let mut entries = self.entries.lock();
        while entries.is_empty() {
            let timed_out = self
                .added
                .wait_for(&mut entries, Duration::from_secs(5))
                .timed_out();
            assert!(!timed_out, "no timer entry was armed");
        }
        entries[0].0
    }

    /// Run the oldest armed entry, waiting for one if needed. Returns its delay.
    pub fn fire_next(&self) -> Duration {
        self.wait_for_entry();
        let (delay, callback) = self.entries.lock().pop_front().expect("entry present");
        callback();
        delay
    }

    /// Number of armed entries.
    pub fn armed(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), EngineError> {
        self.entries.lock().push_back((delay, callback));
        self.added.notify_all();
        Ok(())
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
