//! Infrastructure adapters backing the scheduling core.

pub mod queue;
pub use queue::InMemoryQueue;
