//! Recurring background services.
//!
//! A service is bound to one spool. While enabled it arms a one-shot timer;
//! when the timer fires the payload is submitted to the spool's executor, and
//! only once that tick completes is the next tick armed. Two ticks of the same
//! service therefore never overlap.
//!
//! ```text
//!   DISABLED --enable()--> ARMED --timer fires--> TICK_QUEUED
//!      ^                     ^                        |
//!      |                     +------ completed -------+
//!      +------------ completed after disable() -------+
//! ```
//!
//! A failed tick delays the next one by `interval * retry_after_time_factor`.
//! The delay does not grow with the length of the error streak; callers that
//! want compounding can read [`BackgroundService::sequential_error_count`]
//! and adjust the interval themselves.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::core::audit::{EngineEvent, EventSink};
use crate::core::error::{EngineError, TaskOutcome};
use crate::core::spooler::Spooler;
use crate::core::status::BackgroundServiceStatus;
use crate::core::task::ServiceTask;
use crate::runtime::Timer;
use crate::util::clock::{duration_ms, epoch_ms};

/// Observable lifecycle phase of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    /// Not enabled and no tick in flight.
    Disabled,
    /// Enabled, waiting for the timer.
    Armed,
    /// A tick was handed to the spool and has not completed yet.
    TickQueued,
}

/// Longest delay a failed tick can push the next one out by (30 days).
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Delay before the next tick after a failed one, capped at [`MAX_RETRY_DELAY`].
#[must_use]
pub fn retry_delay(interval: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor)
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

struct ServiceState {
    enabled: bool,
    /// Bumped on every enable/disable; timer callbacks and completions from
    /// an older generation never reschedule.
    generation: u64,
    ticks_in_flight: u32,
    timed_interval: Duration,
    priority: i32,
    retry_after_time_factor: f64,
    sequential_error_count: u32,
    previous_scheduled: Option<SystemTime>,
    next_run_reference_delay: Duration,
}

struct ServiceInner {
    name: String,
    spool: String,
    task: Arc<dyn ServiceTask>,
    description: String,
    spooler: Arc<Spooler>,
    timer: Arc<dyn Timer>,
    events: Arc<dyn EventSink>,
    state: Mutex<ServiceState>,
}

/// Handle to a recurring service. Cloning yields a handle to the same service.
#[derive(Clone)]
pub struct BackgroundService {
    inner: Arc<ServiceInner>,
}

impl BackgroundService {
    pub(crate) fn new(
        name: impl Into<String>,
        spool: impl Into<String>,
        task: Arc<dyn ServiceTask>,
        spooler: Arc<Spooler>,
        timer: Arc<dyn Timer>,
        events: Arc<dyn EventSink>,
        retry_after_time_factor: f64,
    ) -> Self {
        let description = task.description();
        Self {
            inner: Arc::new(ServiceInner {
                name: name.into(),
                spool: spool.into(),
                task,
                description,
                spooler,
                timer,
                events,
                state: Mutex::new(ServiceState {
                    enabled: false,
                    generation: 0,
                    ticks_in_flight: 0,
                    timed_interval: Duration::ZERO,
                    priority: 0,
                    retry_after_time_factor,
                    sequential_error_count: 0,
                    previous_scheduled: None,
                    next_run_reference_delay: Duration::ZERO,
                }),
            }),
        }
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Spool the service submits its ticks to.
    #[must_use]
    pub fn spool_name(&self) -> &str {
        &self.inner.spool
    }

    /// Whether both handles point at the same service.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether the service is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> ServicePhase {
        let state = self.inner.state.lock();
        if state.ticks_in_flight > 0 {
            ServicePhase::TickQueued
        } else if state.enabled {
            ServicePhase::Armed
        } else {
            ServicePhase::Disabled
        }
    }

    /// Nominal interval between ticks.
    #[must_use]
    pub fn timed_interval(&self) -> Duration {
        self.inner.state.lock().timed_interval
    }

    /// Priority ticks are submitted with.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.inner.state.lock().priority
    }

    /// Interval multiplier applied after a failed tick.
    #[must_use]
    pub fn retry_after_time_factor(&self) -> f64 {
        self.inner.state.lock().retry_after_time_factor
    }

    /// Consecutive failed ticks; reset by the first successful one.
    #[must_use]
    pub fn sequential_error_count(&self) -> u32 {
        self.inner.state.lock().sequential_error_count
    }

    /// Set the nominal interval. When armed, applies from the next scheduling decision.
    pub fn set_timed_interval(&self, interval: Duration) -> &Self {
        self.inner.state.lock().timed_interval = interval;
        debug!(service = %self.inner.name, interval_ms = duration_ms(interval), "Timed interval changed");
        self
    }

    /// Set the nominal interval in milliseconds.
    pub fn set_timed_interval_ms(&self, millis: u64) -> &Self {
        self.set_timed_interval(Duration::from_millis(millis))
    }

    /// Set the priority used when ticks are submitted.
    pub fn set_priority(&self, priority: i32) -> &Self {
        self.inner.state.lock().priority = priority;
        self
    }

    /// Set the multiplier applied to the interval after a failed tick.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidArgument` unless `factor` is finite and positive.
    pub fn set_retry_after_time_factor(&self, factor: f64) -> Result<&Self, EngineError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "retry after time factor must be finite and positive, got {factor}"
            )));
        }
        self.inner.state.lock().retry_after_time_factor = factor;
        Ok(self)
    }

    /// Enable the service and arm its first tick one interval from now.
    /// No-op when already enabled.
    ///
    /// # Errors
    ///
    /// - `EngineError::Shutdown` if the spooler is shut down
    /// - `EngineError::InvalidArgument` if no interval was set
    /// - `EngineError::Timer` if the timer refused the first tick; the
    ///   service is left disabled
    pub fn enable(&self) -> Result<&Self, EngineError> {
        let (generation, interval) = {
            let mut state = self.inner.state.lock();
            // Checked under the state lock: shutdown raises the flag before it
            // disables services, so either this sees the flag or the disable
            // sees `enabled`.
            if self.inner.spooler.is_shutdown() {
                return Err(EngineError::Shutdown);
            }
            if state.enabled {
                return Ok(self);
            }
            if state.timed_interval.is_zero() {
                return Err(EngineError::InvalidArgument(format!(
                    "service `{}` needs a timed interval before it can be enabled",
                    self.inner.name
                )));
            }
            state.enabled = true;
            state.generation += 1;
            (state.generation, state.timed_interval)
        };
        self.record_enabled(true);
        self.arm(generation, interval)?;
        Ok(self)
    }

    /// Disable the service. Future ticks are cancelled; a tick already handed
    /// to the spool still runs. No-op when already disabled.
    pub fn disable(&self) -> &Self {
        {
            let mut state = self.inner.state.lock();
            if !state.enabled {
                return self;
            }
            state.enabled = false;
            state.generation += 1;
        }
        self.record_enabled(false);
        self
    }

    /// Point-in-time status.
    #[must_use]
    pub fn last_status(&self) -> BackgroundServiceStatus {
        let state = self.inner.state.lock();
        BackgroundServiceStatus {
            name: self.inner.name.clone(),
            spool_name: self.inner.spool.clone(),
            enabled: state.enabled,
            next_run_reference_delay_millis: duration_ms(state.next_run_reference_delay),
            timed_interval_millis: duration_ms(state.timed_interval),
            previous_scheduled_date_epoch_millis: state.previous_scheduled.map_or(0, epoch_ms),
            priority: state.priority,
            retry_after_time_factor: state.retry_after_time_factor,
            sequential_error_count: state.sequential_error_count,
            task_description: self.inner.description.clone(),
        }
    }

    fn record_enabled(&self, enabled: bool) {
        self.inner.events.record(EngineEvent::ServiceEnabledChanged {
            service: self.inner.name.clone(),
            spool: self.inner.spool.clone(),
            enabled,
        });
    }

    /// Register the next tick with the timer. The lock is not held across the
    /// timer call so timers may run callbacks inline.
    fn arm(&self, generation: u64, delay: Duration) -> Result<(), EngineError> {
        let priority = {
            let mut state = self.inner.state.lock();
            if !state.enabled || state.generation != generation {
                return Ok(());
            }
            state.next_run_reference_delay = delay;
            state.previous_scheduled = Some(SystemTime::now());
            state.priority
        };
        self.inner.events.record(EngineEvent::ServiceTickScheduled {
            service: self.inner.name.clone(),
            spool: self.inner.spool.clone(),
            priority,
            delay_ms: duration_ms(delay),
        });

        let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        let scheduled = self.inner.timer.schedule(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self { inner }.on_tick(generation);
                }
            }),
        );
        if let Err(e) = scheduled {
            error!(service = %self.inner.name, error = %e, "Could not arm next tick, disabling service");
            self.disable_if_current(generation);
            return Err(e);
        }
        Ok(())
    }

    fn on_tick(&self, generation: u64) {
        let priority = {
            let mut state = self.inner.state.lock();
            if !state.enabled || state.generation != generation {
                debug!(service = %self.inner.name, "Stale tick ignored");
                return;
            }
            state.ticks_in_flight += 1;
            state.priority
        };

        let task = Arc::clone(&self.inner.task);
        let this = self.clone();
        let accepted = self.inner.spooler.executor(&self.inner.spool).add_to_queue(
            self.inner.name.clone(),
            priority,
            move || task.run(),
            move |outcome| this.on_tick_done(generation, &outcome),
        );
        if !accepted {
            warn!(service = %self.inner.name, spool = %self.inner.spool, "Tick refused by spool, disabling service");
            self.inner.state.lock().ticks_in_flight -= 1;
            self.disable_if_current(generation);
        }
    }

    fn on_tick_done(&self, generation: u64, outcome: &TaskOutcome) {
        let (next_delay, errors) = {
            let mut state = self.inner.state.lock();
            state.ticks_in_flight = state.ticks_in_flight.saturating_sub(1);
            let delay = match outcome {
                Ok(()) => {
                    state.sequential_error_count = 0;
                    state.timed_interval
                }
                Err(_) => {
                    state.sequential_error_count = state.sequential_error_count.saturating_add(1);
                    retry_delay(state.timed_interval, state.retry_after_time_factor)
                }
            };
            let current = state.enabled && state.generation == generation;
            (current.then_some(delay), state.sequential_error_count)
        };

        if outcome.is_err() {
            self.inner.events.record(EngineEvent::ServiceTickFailed {
                service: self.inner.name.clone(),
                spool: self.inner.spool.clone(),
                sequential_errors: errors,
            });
        }

        if let Some(delay) = next_delay {
            // Errors are already logged and the service disabled by `arm`.
            let _ = self.arm(generation, delay);
        }
    }

    fn disable_if_current(&self, generation: u64) {
        let changed = {
            let mut state = self.inner.state.lock();
            if state.enabled && state.generation == generation {
                state.enabled = false;
                state.generation += 1;
                true
            } else {
                false
            }
        };
        if changed {
            self.record_enabled(false);
        }
    }
}

impl std::fmt::Debug for BackgroundService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundService")
            .field("name", &self.inner.name)
            .field("spool", &self.inner.spool)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::audit::TracingEventSink;
    use crate::core::error::AppResult;
    use crate::runtime::TimerCallback;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records entries; `fire` runs the oldest on the calling thread.
    #[derive(Default)]
    struct RecordingTimer {
        entries: Mutex<Vec<(Duration, TimerCallback)>>,
    }

    impl RecordingTimer {
        fn fire(&self) {
            let (_, callback) = self.entries.lock().remove(0);
            callback();
        }

        fn armed(&self) -> usize {
            self.entries.lock().len()
        }
    }

    impl Timer for RecordingTimer {
        fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), EngineError> {
            self.entries.lock().push((delay, callback));
            Ok(())
        }
    }

    struct Fixture {
        timer: Arc<RecordingTimer>,
        spooler: Arc<Spooler>,
        runs: Arc<AtomicU32>,
        service: BackgroundService,
    }

    fn fixture() -> Fixture {
        let timer = Arc::new(RecordingTimer::default());
        let spooler = Arc::new(Spooler::new(&EngineConfig::default(), Arc::new(TracingEventSink)));
        let runs = Arc::new(AtomicU32::new(0));
        let runs_task = Arc::clone(&runs);
        let task = move || -> AppResult<()> {
            runs_task.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        let service = BackgroundService::new(
            "scanner",
            "scans",
            Arc::new(task),
            Arc::clone(&spooler),
            timer.clone(),
            Arc::new(TracingEventSink),
            1.0,
        );
        Fixture {
            timer,
            spooler,
            runs,
            service,
        }
    }

    #[test]
    fn test_created_disabled() {
        let f = fixture();
        assert!(!f.service.is_enabled());
        assert_eq!(f.service.phase(), ServicePhase::Disabled);
        assert_eq!(f.service.priority(), 0);
        assert_eq!(f.service.timed_interval(), Duration::ZERO);
    }

    #[test]
    fn test_enable_requires_interval() {
        let f = fixture();
        assert!(matches!(f.service.enable(), Err(EngineError::InvalidArgument(_))));
        assert!(!f.service.is_enabled());
    }

    #[test]
    fn test_enable_twice_arms_once() {
        let f = fixture();
        f.service.set_timed_interval_ms(50);
        f.service.enable().unwrap();
        f.service.enable().unwrap();
        assert_eq!(f.timer.armed(), 1);
        assert_eq!(f.service.phase(), ServicePhase::Armed);
    }

    #[test]
    fn test_disable_cancels_armed_tick() {
        let f = fixture();
        f.service.set_timed_interval_ms(10);
        f.service.enable().unwrap();
        f.service.disable();
        f.service.disable();
        assert!(!f.service.is_enabled());

        f.timer.fire();
        f.spooler.wait_to_close();
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
        assert_eq!(f.timer.armed(), 0);
        assert_eq!(f.service.phase(), ServicePhase::Disabled);
    }

    #[test]
    fn test_tick_refused_after_spooler_shutdown_disables() {
        let f = fixture();
        f.service.set_timed_interval_ms(10);
        f.service.enable().unwrap();
        f.spooler.shutdown();
        f.timer.fire();
        assert!(!f.service.is_enabled());
        assert_eq!(f.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enable_after_shutdown_fails() {
        let f = fixture();
        f.service.set_timed_interval_ms(10);
        f.spooler.shutdown();
        assert!(matches!(f.service.enable(), Err(EngineError::Shutdown)));
        assert_eq!(f.timer.armed(), 0);
    }

    #[test]
    fn test_invalid_factor_rejected() {
        let f = fixture();
        assert!(f.service.set_retry_after_time_factor(0.0).is_err());
        assert!(f.service.set_retry_after_time_factor(f64::NAN).is_err());
        assert!((f.service.retry_after_time_factor() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(Duration::from_millis(100), 2.5), Duration::from_millis(250));
        assert_eq!(retry_delay(Duration::from_millis(5), 1e30), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(Duration::MAX, 10.0), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(MAX_RETRY_DELAY, 1.0), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_status_snapshot() {
        let f = fixture();
        f.service.set_timed_interval_ms(25).set_priority(7);
        let status = f.service.last_status();
        assert_eq!(status.name, "scanner");
        assert_eq!(status.spool_name, "scans");
        assert_eq!(status.timed_interval_millis, 25);
        assert_eq!(status.priority, 7);
        assert_eq!(status.previous_scheduled_date_epoch_millis, 0);
        assert!(status.task_description.contains("closure"));
    }
}
