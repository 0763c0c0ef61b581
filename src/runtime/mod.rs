//! Timer facilities driving background service ticks.

pub mod timer;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_timer;

pub use timer::{ThreadTimer, Timer, TimerCallback};
#[cfg(feature = "tokio-runtime")]
pub use tokio_timer::TokioTimer;
