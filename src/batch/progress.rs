//! Batch Progress Module
//!
//! Aggregate progress accounting for a batch job, including the guarded ETA
//! projection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;

use crate::clock::Clock;

// == Progress Snapshot ==
/// Point-in-time view of a batch job.
///
/// `eta_seconds` is `None` whenever no throughput has been observed yet
/// (zero elapsed time or zero completed items); it is never infinite or NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Total number of items in the batch
    pub total: usize,
    /// Items that reached a terminal outcome
    pub processed: usize,
    /// Items that succeeded
    pub succeeded: usize,
    /// Items that failed after exhausting retries
    pub failed: usize,
    /// Items skipped because the batch was cancelled
    pub cancelled: usize,
    /// Projected seconds until completion, if a rate is observable
    pub eta_seconds: Option<f64>,
}

// == Progress Tracker ==
/// Shared counter state updated exactly once per settled item.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: usize,
    started_at: Instant,
    clock: Arc<dyn Clock>,
    counts: Mutex<Counts>,
}

#[derive(Debug, Default, Clone)]
struct Counts {
    processed: usize,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            total,
            started_at: clock.now(),
            clock,
            counts: Mutex::new(Counts::default()),
        }
    }

    pub(crate) fn record_success(&self) {
        let mut counts = self.lock();
        counts.processed += 1;
        counts.succeeded += 1;
    }

    pub(crate) fn record_failure(&self) {
        let mut counts = self.lock();
        counts.processed += 1;
        counts.failed += 1;
    }

    pub(crate) fn record_cancelled(&self) {
        let mut counts = self.lock();
        counts.processed += 1;
        counts.cancelled += 1;
    }

    // == Snapshot ==
    /// Builds a consistent snapshot with the ETA projection.
    ///
    /// The rate is computed only when elapsed time is positive, and the ETA
    /// only when the rate is positive, so the division can never produce
    /// infinity or NaN.
    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let counts = self.lock().clone();
        let elapsed = (self.clock.now() - self.started_at).as_secs_f64();

        let eta_seconds = if elapsed > 0.0 && counts.processed > 0 {
            let rate = counts.processed as f64 / elapsed;
            if rate > 0.0 {
                Some((self.total - counts.processed) as f64 / rate)
            } else {
                None
            }
        } else {
            None
        };

        ProgressSnapshot {
            total: self.total,
            processed: counts.processed,
            succeeded: counts.succeeded,
            failed: counts.failed,
            cancelled: counts.cancelled,
            eta_seconds,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
