//! Per-spool executor: a priority queue of pending tasks plus one worker thread.
//!
//! The worker is spawned lazily on the first submission that finds the spool
//! idle, drains the queue one task at a time and retires as soon as the queue
//! is empty. A later submission spawns a fresh worker, which is why the
//! spooler reports a cumulative created-threads count rather than a live one.
//!
//! # Design Principles
//!
//! - **One task at a time**: a spool never runs two of its tasks concurrently
//! - **Failure isolation**: errors and panics are caught at the task boundary
//!   and delivered to the task's completion callback
//! - **No polling**: idle waiters block on a `Condvar` signalled by the worker

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::core::audit::{EngineEvent, EventSink};
use crate::core::error::{AppResult, TaskError, TaskOutcome};
use crate::core::status::SpoolStatus;
use crate::core::task::{Completion, Task, TaskQueue};
use crate::infra::queue::InMemoryQueue;
use crate::util::clock::duration_ms;

/// Settings and counters shared by every executor of one spooler.
pub(crate) struct WorkerContext {
    /// Spooler-wide shutdown flag, checked on every submission.
    pub shutdown: AtomicBool,
    /// Worker threads ever spawned, across all spools.
    pub created_threads: AtomicU64,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub drain_on_shutdown: bool,
    pub events: Arc<dyn EventSink>,
}

/// Per-spool counters (lock-free atomics).
#[derive(Default)]
struct SpoolCounters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct ExecutorState {
    queue: InMemoryQueue,
    next_sequence: u64,
    worker_active: bool,
    shutdown: bool,
}

struct ExecutorInner {
    spool: String,
    state: Mutex<ExecutorState>,
    /// Signalled whenever the worker retires or the executor shuts down.
    idle: Condvar,
    counters: SpoolCounters,
    ctx: Arc<WorkerContext>,
}

/// Executor owning the pending tasks of one spool.
///
/// Cloning is cheap and yields a handle to the same executor.
#[derive(Clone)]
pub struct SpoolExecutor {
    inner: Arc<ExecutorInner>,
}

impl SpoolExecutor {
    pub(crate) fn new(spool: impl Into<String>, ctx: Arc<WorkerContext>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                spool: spool.into(),
                state: Mutex::new(ExecutorState {
                    queue: InMemoryQueue::new(),
                    next_sequence: 0,
                    worker_active: false,
                    shutdown: false,
                }),
                idle: Condvar::new(),
                counters: SpoolCounters::default(),
                ctx,
            }),
        }
    }

    /// An executor that refuses every submission. Handed out for spool names
    /// requested after the owning spooler was shut down.
    pub(crate) fn closed(spool: impl Into<String>, ctx: Arc<WorkerContext>) -> Self {
        let executor = Self::new(spool, ctx);
        executor.inner.state.lock().shutdown = true;
        executor
    }

    /// Spool this executor serves.
    #[must_use]
    pub fn spool_name(&self) -> &str {
        &self.inner.spool
    }

    /// Whether both handles point at the same executor.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether this executor stopped accepting work.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown || self.inner.ctx.shutdown.load(Ordering::SeqCst)
    }

    /// Tasks accepted but not started yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Queue a task built from its parts. See [`SpoolExecutor::submit`].
    pub fn add_to_queue<A, C>(
        &self,
        name: impl Into<String>,
        priority: i32,
        action: A,
        completion: C,
    ) -> bool
    where
        A: FnOnce() -> AppResult<()> + Send + 'static,
        C: FnOnce(TaskOutcome) + Send + 'static,
    {
        self.submit(Task::new(name, priority, action, completion))
    }

    /// Queue a task for asynchronous execution.
    ///
    /// Returns `false`, without queueing and without calling the completion
    /// callback, when the executor is shut down or no worker thread could be
    /// started. Otherwise the completion callback is called exactly once,
    /// from a worker thread.
    pub fn submit(&self, mut task: Task) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if state.shutdown || inner.ctx.shutdown.load(Ordering::SeqCst) {
            drop(state);
            inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            inner.ctx.events.record(EngineEvent::TaskRejected {
                task: task.name,
                spool: inner.spool.clone(),
            });
            return false;
        }

        // The new worker blocks on `state` until this submission is queued.
        if !state.worker_active {
            if let Err(e) = spawn_worker(Arc::clone(inner)) {
                error!(spool = %inner.spool, task = %task.name, error = %e, "Failed to spawn spool worker");
                return false;
            }
            state.worker_active = true;
        }

        task.sequence = state.next_sequence;
        state.next_sequence += 1;
        debug!(
            spool = %inner.spool,
            task = %task.name,
            priority = task.priority,
            sequence = task.sequence,
            "Task queued"
        );
        state.queue.enqueue(task);
        inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Stop accepting tasks. Non-blocking.
    ///
    /// Queued tasks keep running when the context drains on shutdown;
    /// otherwise they are removed and completed with [`TaskError::Discarded`].
    pub(crate) fn shutdown(&self) {
        let inner = &self.inner;
        let discarded = {
            let mut state = inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            if inner.ctx.drain_on_shutdown {
                Vec::new()
            } else {
                state.queue.drain()
            }
        };
        inner.idle.notify_all();

        if !discarded.is_empty() {
            info!(spool = %inner.spool, count = discarded.len(), "Discarding queued tasks on shutdown");
        }
        for task in discarded {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            deliver(&inner.spool, &task.name, task.completion, Err(TaskError::Discarded));
        }
    }

    /// Block until the queue is empty and the worker has retired.
    ///
    /// Must not be called from a task running on this same spool.
    pub(crate) fn wait_idle(&self) {
        let mut state = self.inner.state.lock();
        while state.worker_active || !state.queue.is_empty() {
            self.inner.idle.wait(&mut state);
        }
    }

    /// Point-in-time view of this spool.
    #[must_use]
    pub fn status(&self) -> SpoolStatus {
        let (pending, worker_active, shutdown) = {
            let state = self.inner.state.lock();
            (state.queue.len(), state.worker_active, state.shutdown)
        };
        let counters = &self.inner.counters;
        SpoolStatus {
            name: self.inner.spool.clone(),
            pending_tasks: pending,
            worker_active,
            is_shutdown: shutdown,
            submitted_tasks: counters.submitted.load(Ordering::Relaxed),
            rejected_tasks: counters.rejected.load(Ordering::Relaxed),
            completed_tasks: counters.completed.load(Ordering::Relaxed),
            failed_tasks: counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for SpoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolExecutor")
            .field("spool", &self.inner.spool)
            .finish_non_exhaustive()
    }
}

/// Spawn a worker thread for a spool.
fn spawn_worker(inner: Arc<ExecutorInner>) -> std::io::Result<()> {
    let ctx = Arc::clone(&inner.ctx);
    let ordinal = ctx.created_threads.load(Ordering::Relaxed) + 1;
    let mut builder =
        thread::Builder::new().name(format!("{}-{}-{ordinal}", ctx.thread_name_prefix, inner.spool));
    if let Some(stack_size) = ctx.stack_size {
        builder = builder.stack_size(stack_size);
    }
    builder.spawn(move || worker_loop(&inner))?;
    ctx.created_threads.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Run queued tasks until the queue is empty, then retire.
fn worker_loop(inner: &ExecutorInner) {
    debug!(spool = %inner.spool, "Spool worker started");
    loop {
        let next = {
            let mut state = inner.state.lock();
            let next = state.queue.dequeue();
            if next.is_none() {
                state.worker_active = false;
                inner.idle.notify_all();
            }
            next
        };
        let Some(task) = next else {
            break;
        };
        run_task(inner, task);
    }
    debug!(spool = %inner.spool, "Spool worker retired");
}

fn run_task(inner: &ExecutorInner, task: Task) {
    let Task {
        name,
        action,
        completion,
        ..
    } = task;
    let events = &inner.ctx.events;

    events.record(EngineEvent::TaskStarted {
        task: name.clone(),
        spool: inner.spool.clone(),
    });
    let started = Instant::now();

    let outcome = match panic::catch_unwind(AssertUnwindSafe(action)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(payload) => {
            let err = TaskError::from_panic(payload.as_ref());
            error!(spool = %inner.spool, task = %name, error = %err, "Task panicked");
            Err(err)
        }
    };

    if outcome.is_ok() {
        inner.counters.completed.fetch_add(1, Ordering::Relaxed);
    } else {
        inner.counters.failed.fetch_add(1, Ordering::Relaxed);
    }
    events.record(EngineEvent::TaskFinished {
        task: name.clone(),
        spool: inner.spool.clone(),
        elapsed_ms: duration_ms(started.elapsed()),
        error: outcome.as_ref().err().map(ToString::to_string),
    });

    deliver(&inner.spool, &name, completion, outcome);
}

/// Hand an outcome to a completion callback, containing any panic it raises.
fn deliver(spool: &str, task: &str, completion: Completion, outcome: TaskOutcome) {
    if panic::catch_unwind(AssertUnwindSafe(move || completion(outcome))).is_err() {
        error!(spool = %spool, task = %task, "Task completion callback panicked");
    }
}
