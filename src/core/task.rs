//! Task definitions, recurring payload abstraction and the queue trait.

use std::fmt;

use super::error::{AppResult, TaskOutcome};

/// One-shot work run by a spool worker.
pub type TaskAction = Box<dyn FnOnce() -> AppResult<()> + Send + 'static>;

/// Completion callback, invoked exactly once with the task outcome.
pub type Completion = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// A one-shot task: submitted once, executed at most once.
///
/// Ordering inside a spool is by `priority` (highest first), then by
/// submission order. The `sequence` is stamped by the executor on submit.
pub struct Task {
    /// Human readable name, used in logs and events.
    pub name: String,
    /// Queue priority, higher runs first.
    pub priority: i32,
    /// Arrival order within the owning spool.
    pub(crate) sequence: u64,
    pub(crate) action: TaskAction,
    pub(crate) completion: Completion,
}

impl Task {
    /// Create a task from its action and completion callback.
    pub fn new<A, C>(name: impl Into<String>, priority: i32, action: A, completion: C) -> Self
    where
        A: FnOnce() -> AppResult<()> + Send + 'static,
        C: FnOnce(TaskOutcome) + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            sequence: 0,
            action: Box::new(action),
            completion: Box::new(completion),
        }
    }

    /// Arrival sequence number assigned by the executor.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Recurring payload of a background service.
///
/// Any `Fn() -> AppResult<()>` closure is a `ServiceTask`; implement the
/// trait on a named type to control the description shown in status.
pub trait ServiceTask: Send + Sync + 'static {
    /// Run one tick of the service.
    ///
    /// # Errors
    ///
    /// An error counts as a failed tick and triggers the retry delay.
    fn run(&self) -> AppResult<()>;

    /// Text reported as `taskDescription` in service status.
    fn description(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl<F> ServiceTask for F
where
    F: Fn() -> AppResult<()> + Send + Sync + 'static,
{
    fn run(&self) -> AppResult<()> {
        self()
    }
}

/// Abstraction for per-spool pending task storage.
pub trait TaskQueue: Send {
    /// Store a task.
    fn enqueue(&mut self, task: Task);
    /// Remove and return the next task to run, honoring priority then arrival order.
    fn dequeue(&mut self) -> Option<Task>;
    /// Remove every pending task, in dequeue order.
    fn drain(&mut self) -> Vec<Task>;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether no task is pending.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
