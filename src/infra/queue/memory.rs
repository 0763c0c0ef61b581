//! In-memory spool queue with priority and arrival-order awareness.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::{Task, TaskQueue};

/// Wrapper to make a `Task` orderable by priority (highest first) and FIFO within priority.
struct PriorityTask {
    task: Task,
}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.task.priority.cmp(&other.task.priority) {
            Ordering::Equal => {
                // FIFO within same priority: lower sequence wins (reversed for max-heap)
                other.task.sequence.cmp(&self.task.sequence)
            }
            other => other,
        }
    }
}

/// Unbounded in-memory queue storing pending tasks in a priority heap.
/// This provides O(log n) enqueue and O(log n) dequeue operations.
#[derive(Default)]
pub struct InMemoryQueue {
    tasks: BinaryHeap<PriorityTask>,
}

impl InMemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: BinaryHeap::new(),
        }
    }
}

impl TaskQueue for InMemoryQueue {
    fn enqueue(&mut self, task: Task) {
        self.tasks.push(PriorityTask { task });
    }

    fn dequeue(&mut self) -> Option<Task> {
        self.tasks.pop().map(|pt| pt.task)
    }

    fn drain(&mut self) -> Vec<Task> {
        let mut out = Vec::with_capacity(self.tasks.len());
        while let Some(pt) = self.tasks.pop() {
            out.push(pt.task);
        }
        out
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}
