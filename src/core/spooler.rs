//! Registry of named spool executors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::audit::{EngineEvent, EventSink};
use crate::core::executor::{SpoolExecutor, WorkerContext};
use crate::core::status::SpoolerStatus;

/// Owns one [`SpoolExecutor`] per spool name.
///
/// Executors are created on first use. Concurrent requests for the same name
/// always observe the same executor. Once [`Spooler::shutdown`] has been
/// called no new spool is registered and every submission is refused.
pub struct Spooler {
    executors: RwLock<HashMap<String, SpoolExecutor>>,
    ctx: Arc<WorkerContext>,
}

impl Spooler {
    /// Create a spooler from engine configuration and an event sink.
    #[must_use]
    pub fn new(config: &EngineConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
            ctx: Arc::new(WorkerContext {
                shutdown: AtomicBool::new(false),
                created_threads: AtomicU64::new(0),
                thread_name_prefix: config.thread_name_prefix.clone(),
                stack_size: config.worker_stack_size,
                drain_on_shutdown: config.drain_on_shutdown,
                events,
            }),
        }
    }

    /// Get the executor for `spool`, creating and registering it if needed.
    ///
    /// After shutdown, unknown names get an unregistered executor that refuses
    /// every submission.
    pub fn executor(&self, spool: &str) -> SpoolExecutor {
        if let Some(executor) = self.executors.read().get(spool) {
            return executor.clone();
        }

        let mut executors = self.executors.write();
        if let Some(executor) = executors.get(spool) {
            return executor.clone();
        }
        // Checked under the write lock: `shutdown` flips the flag before it
        // walks the map, so a spool registered here is always shut down too.
        if self.ctx.shutdown.load(Ordering::SeqCst) {
            debug!(spool = %spool, "Spool requested after shutdown");
            return SpoolExecutor::closed(spool, Arc::clone(&self.ctx));
        }
        let executor = SpoolExecutor::new(spool, Arc::clone(&self.ctx));
        executors.insert(spool.to_string(), executor.clone());
        drop(executors);

        self.ctx.events.record(EngineEvent::SpoolCreated {
            spool: spool.to_string(),
        });
        executor
    }

    /// Names of every registered spool, sorted.
    #[must_use]
    pub fn spool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether shutdown has been initiated.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.ctx.shutdown.load(Ordering::SeqCst)
    }

    /// Point-in-time status of the spooler and each spool.
    #[must_use]
    pub fn last_status(&self) -> SpoolerStatus {
        let executors: Vec<SpoolExecutor> = self.executors.read().values().cloned().collect();
        let mut spools: Vec<_> = executors.iter().map(SpoolExecutor::status).collect();
        spools.sort_by(|a, b| a.name.cmp(&b.name));
        SpoolerStatus {
            is_shutdown: self.is_shutdown(),
            created_threads_count: self.ctx.created_threads.load(Ordering::Relaxed),
            spools,
        }
    }

    /// Stop accepting work on every spool. Non-blocking and idempotent.
    pub fn shutdown(&self) {
        if self.ctx.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down spooler");
        let executors: Vec<SpoolExecutor> = self.executors.read().values().cloned().collect();
        for executor in executors {
            executor.shutdown();
        }
    }

    /// Block until every spool has finished its accepted work and released
    /// its worker. Does not itself initiate shutdown.
    ///
    /// Must not be called from inside a running task.
    pub fn wait_to_close(&self) {
        let executors: Vec<SpoolExecutor> = self.executors.read().values().cloned().collect();
        for executor in &executors {
            executor.wait_idle();
        }
        info!(
            spools = executors.len(),
            created_threads = self.ctx.created_threads.load(Ordering::Relaxed),
            "Spooler closed"
        );
    }
}

impl std::fmt::Debug for Spooler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spooler")
            .field("spools", &self.spool_names())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit::InMemoryEventSink;
    use std::thread;

    fn make_spooler() -> (Spooler, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::new(256));
        let spooler = Spooler::new(&EngineConfig::default(), sink.clone());
        (spooler, sink)
    }

    #[test]
    fn test_same_name_same_executor() {
        let (spooler, sink) = make_spooler();
        let a = spooler.executor("jobs");
        let b = spooler.executor("jobs");
        assert!(a.ptr_eq(&b));
        assert_eq!(spooler.spool_names(), vec!["jobs"]);
        assert_eq!(
            sink.matching(|e| matches!(e, EngineEvent::SpoolCreated { .. })).len(),
            1
        );
    }

    #[test]
    fn test_concurrent_creation_registers_once() {
        let (spooler, _) = make_spooler();
        let spooler = Arc::new(spooler);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let spooler = Arc::clone(&spooler);
                thread::spawn(move || spooler.executor("shared"))
            })
            .collect();
        let executors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(executors.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert_eq!(spooler.spool_names().len(), 1);
    }

    #[test]
    fn test_no_new_spool_after_shutdown() {
        let (spooler, _) = make_spooler();
        spooler.executor("before");
        spooler.shutdown();

        let late = spooler.executor("after");
        assert!(late.is_shutdown());
        assert_eq!(spooler.spool_names(), vec!["before"]);
        assert!(spooler.executor("before").is_shutdown());
    }

    #[test]
    fn test_status_counts_threads() {
        let (spooler, _) = make_spooler();
        assert_eq!(spooler.last_status().created_threads_count, 0);
        spooler.executor("a").add_to_queue("t", 0, || Ok(()), |_| {});
        spooler.executor("b").add_to_queue("t", 0, || Ok(()), |_| {});
        spooler.shutdown();
        spooler.wait_to_close();

        let status = spooler.last_status();
        assert!(status.is_shutdown);
        assert_eq!(status.created_threads_count, 2);
        assert_eq!(status.spools.len(), 2);
        assert_eq!(status.spools[0].name, "a");
    }
}
