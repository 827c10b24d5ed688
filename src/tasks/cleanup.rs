//! TTL Cleanup Lifecycle
//!
//! Ownership plumbing for the background sweep task. The task itself is
//! spawned by [`BoundedCache::start_periodic_cleanup`]
//! (crate::cache::BoundedCache::start_periodic_cleanup); this module owns its
//! handle so the timer always has a teardown path: an explicit `stop`, a
//! replacement sweep, or the drop of the last owner all abort it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::debug;

// == Cleanup Slot ==
/// Holds the join handle of at most one running sweep task.
#[derive(Debug, Default)]
pub(crate) struct CleanupSlot {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupSlot {
    /// Installs a new sweep task, aborting any previous one.
    pub(crate) fn replace(&self, handle: JoinHandle<()>) {
        if let Some(old) = self.lock().replace(handle) {
            old.abort();
            debug!("previous cleanup task replaced");
        }
    }

    /// Aborts the sweep task if one is running. Safe to call repeatedly.
    pub(crate) fn stop(&self) {
        if let Some(task) = self.lock().take() {
            task.abort();
            debug!("periodic cleanup stopped");
        }
    }

    /// Returns true while a sweep task is installed and not finished.
    pub(crate) fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CleanupSlot {
    fn drop(&mut self) {
        self.stop();
    }
}

// == Cleanup Handle ==
/// Owned handle to a periodic cleanup task.
///
/// Returned by `start_periodic_cleanup`; call [`stop`](CleanupHandle::stop)
/// on disposal. The handle shares ownership with the cache that spawned the
/// task, so the task is also aborted when both sides are dropped.
#[derive(Debug, Clone)]
pub struct CleanupHandle {
    slot: Arc<CleanupSlot>,
}

impl CleanupHandle {
    pub(crate) fn new(slot: Arc<CleanupSlot>) -> Self {
        Self { slot }
    }

    /// Stops the cleanup task. Idempotent.
    pub fn stop(&self) {
        self.slot.stop();
    }

    /// Returns true while the cleanup task is running.
    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_aborts_task() {
        let slot = Arc::new(CleanupSlot::default());
        slot.replace(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        let handle = CleanupHandle::new(Arc::clone(&slot));
        assert!(handle.is_running());

        handle.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let slot = Arc::new(CleanupSlot::default());
        slot.replace(tokio::spawn(async {}));

        let handle = CleanupHandle::new(slot);
        handle.stop();
        handle.stop();
        handle.stop();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_replace_aborts_previous_task() {
        let slot = CleanupSlot::default();
        let first = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let first_probe = first.abort_handle();
        slot.replace(first);
        slot.replace(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(first_probe.is_finished());
        assert!(slot.is_running());
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let probe = task.abort_handle();

        {
            let slot = CleanupSlot::default();
            slot.replace(task);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(probe.is_finished());
    }
}
