//! Single-flight guard for scheduled jobs.
//!
//! A tick that arrives while the previous run of the same job is still
//! active is skipped. The guard also lets shutdown wait until the job is
//! idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Tracks whether a job is currently running.
#[derive(Clone, Default)]
pub struct OverlapGuard {
    inner: Arc<GuardState>,
}

#[derive(Default)]
struct GuardState {
    running: AtomicBool,
    idle: Notify,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard for one run.
    ///
    /// Returns `None` when a run is already in flight.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                inner: self.inner.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Wait until no run is in flight. Returns `false` if `timeout` elapsed
    /// first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.is_running() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// RAII guard that releases the running flag when dropped, including on
/// panic or cancellation of the run.
pub struct RunGuard {
    inner: Arc<GuardState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.idle.notify_waiters();
    }
}
