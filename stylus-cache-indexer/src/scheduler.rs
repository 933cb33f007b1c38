//! Interval scheduler owning the periodic task handles.
//!
//! Replaces decorator-driven cron with explicit ownership: the scheduler
//! holds every `JoinHandle` it spawns and a cancellation token, so shutdown
//! can stop the timers deterministically. Tasks fire on a fixed period; a
//! tick whose work overruns simply delays the next tick.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Owns periodic background tasks.
#[derive(Debug)]
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler tied to the given shutdown token.
    #[must_use]
    pub const fn new(shutdown: CancellationToken) -> Self {
        Self {
            handles: Vec::new(),
            shutdown,
        }
    }

    /// Spawn a named task firing every `period`.
    ///
    /// The first tick fires after one full period, not immediately - the
    /// application runs the initial pass itself during startup.
    pub fn spawn_interval<F, Fut>(&mut self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // consume the immediate tick

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!(task = name, "Scheduled task stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        debug!(task = name, "Scheduled task firing");
                        task().await;
                    }
                }
            }
        });

        self.handles.push(handle);
        info!(task = name, period_secs = period.as_secs(), "Scheduled periodic task");
    }

    /// Stop every task. The shutdown token must already be cancelled by the
    /// owner; remaining handles are aborted in case a task ignored it.
    pub async fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        info!("Scheduler stopped");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_task_fires_on_schedule() {
        let token = CancellationToken::new();
        let mut scheduler = Scheduler::new(token.clone());
        let fired = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&fired);
        scheduler.spawn_interval("test", Duration::from_secs(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::task::yield_now().await;

        // No immediate fire
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst) >= 1);

        token.cancel();
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_without_tasks_is_clean() {
        let token = CancellationToken::new();
        let mut scheduler = Scheduler::new(token.clone());
        token.cancel();
        scheduler.stop().await;
    }
}
