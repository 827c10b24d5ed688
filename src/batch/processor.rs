//! Batch Processor Module
//!
//! Applies a user-supplied async worker to every item of an ordered list
//! under a shared concurrency bound, with per-item timeout, bounded retries
//! with exponential backoff, and live progress reporting.
//!
//! Each item holds one semaphore permit for its whole attempt loop; the
//! permit is an RAII guard, so it is returned on every exit path. Worker
//! panics are caught and recorded as failed attempts, and one item's
//! permanent failure never aborts the rest of the batch.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, warn};

use crate::batch::progress::{ProgressSnapshot, ProgressTracker};
use crate::clock::{Clock, SystemClock};
use crate::config::BatchConfig;
use crate::error::Result;
use crate::semaphore::Semaphore;

// == Cancel Flag ==
/// Cooperative cancellation signal for a batch job.
///
/// Cancelling stops new items from being scheduled; items already running
/// are awaited, never forcibly killed (a worker only stops early if it
/// honors the signal itself). Items that never started settle as
/// [`ItemOutcome::Cancelled`].
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::channel(false).0),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves when cancellation is requested; pending otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

// == Attempt History ==
/// Terminal result of a single worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
}

/// One entry in an item's attempt history.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    pub started_at: Instant,
    pub completed_at: Instant,
    pub outcome: AttemptOutcome,
}

// == Item Report ==
/// Terminal outcome of one item.
#[derive(Debug)]
pub enum ItemOutcome<R, E> {
    /// The worker returned a value on some attempt
    Succeeded(R),
    /// Every attempt failed or timed out; `last_error` is `None` when the
    /// final attempt was a timeout or a panic
    Failed { last_error: Option<E> },
    /// The batch was cancelled before this item ran
    Cancelled,
}

/// Per-item result with its full attempt history.
#[derive(Debug)]
pub struct ItemReport<R, E> {
    /// Position of the item in the input list
    pub index: usize,
    pub attempts: Vec<Attempt>,
    pub outcome: ItemOutcome<R, E>,
}

/// Final aggregate of a batch run, ordered by item index.
#[derive(Debug)]
pub struct BatchReport<R, E> {
    pub items: Vec<ItemReport<R, E>>,
    pub progress: ProgressSnapshot,
}

// == Batch Job ==
/// Handle to a running batch: observe progress, cancel, await the report.
#[derive(Debug)]
pub struct BatchJob<R, E> {
    handle: JoinHandle<BatchReport<R, E>>,
    progress: Arc<ProgressTracker>,
    cancel: CancelFlag,
}

impl<R, E> BatchJob<R, E> {
    /// Live progress snapshot.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Stops scheduling new items; in-flight items are awaited.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The job's cancellation flag, for workers that honor the signal.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Waits for every item to settle and returns the final report.
    pub async fn wait(self) -> BatchReport<R, E> {
        match self.handle.await {
            Ok(report) => report,
            Err(err) => {
                error!(%err, "batch supervisor task failed");
                BatchReport {
                    items: Vec::new(),
                    progress: self.progress.snapshot(),
                }
            }
        }
    }
}

// == Batch Processor ==
/// Bounded-concurrency executor for ordered item lists.
///
/// All jobs submitted to the same processor share one semaphore, so the
/// configured concurrency bounds the processor as a whole.
pub struct BatchProcessor {
    config: BatchConfig,
    semaphore: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchProcessor {
    // == Constructors ==
    /// Creates a processor driven by the system clock.
    pub fn new(config: BatchConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a processor driven by the given clock.
    pub fn with_clock(config: BatchConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.concurrency)?);
        Ok(Self {
            config,
            semaphore,
            clock,
        })
    }

    // == Spawn ==
    /// Starts processing `items` and returns a handle to the running job.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T, R, E, W, Fut>(&self, items: Vec<T>, worker: W) -> BatchJob<R, E>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        W: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let total = items.len();
        let progress = Arc::new(ProgressTracker::new(total, Arc::clone(&self.clock)));
        let cancel = CancelFlag::new();
        let worker = Arc::new(worker);

        let config = self.config.clone();
        let semaphore = Arc::clone(&self.semaphore);
        let clock = Arc::clone(&self.clock);
        let task_progress = Arc::clone(&progress);
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut set = JoinSet::new();
            for (index, item) in items.into_iter().enumerate() {
                set.spawn(run_item(
                    config.clone(),
                    Arc::clone(&semaphore),
                    Arc::clone(&clock),
                    Arc::clone(&task_progress),
                    task_cancel.clone(),
                    Arc::clone(&worker),
                    index,
                    item,
                ));
            }

            let mut slots: Vec<Option<ItemReport<R, E>>> = (0..total).map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(report) => {
                        let index = report.index;
                        slots[index] = Some(report);
                    }
                    Err(err) => error!(%err, "batch item task failed"),
                }
            }

            BatchReport {
                items: slots.into_iter().flatten().collect(),
                progress: task_progress.snapshot(),
            }
        });

        BatchJob {
            handle,
            progress,
            cancel,
        }
    }

    // == Process ==
    /// Convenience wrapper: spawn the job and wait for the final report.
    pub async fn process<T, R, E, W, Fut>(&self, items: Vec<T>, worker: W) -> BatchReport<R, E>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        W: Fn(T, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.spawn(items, worker).wait().await
    }
}

// == Per-Item Attempt Loop ==
enum Settled<R, E> {
    Success(R),
    Failed(Option<E>),
    TimedOut,
}

#[allow(clippy::too_many_arguments)]
async fn run_item<T, R, E, W, Fut>(
    config: BatchConfig,
    semaphore: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    progress: Arc<ProgressTracker>,
    cancel: CancelFlag,
    worker: Arc<W>,
    index: usize,
    item: T,
) -> ItemReport<R, E>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    W: Fn(T, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
{
    let mut attempts: Vec<Attempt> = Vec::new();
    let cancelled = |attempts: Vec<Attempt>| ItemReport {
        index,
        attempts,
        outcome: ItemOutcome::Cancelled,
    };

    if cancel.is_cancelled() {
        progress.record_cancelled();
        return cancelled(attempts);
    }

    // One permit covers the whole attempt loop, backoff included
    let _permit = match semaphore.acquire_until(cancel.cancelled()).await {
        Ok(permit) => permit,
        Err(_) => {
            progress.record_cancelled();
            return cancelled(attempts);
        }
    };
    if cancel.is_cancelled() {
        progress.record_cancelled();
        return cancelled(attempts);
    }

    let mut last_error: Option<E> = None;
    for attempt in 1..=config.max_retries + 1 {
        if attempt > 1 {
            let delay = backoff_delay(&config, attempt - 1);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    progress.record_cancelled();
                    return cancelled(attempts);
                }
            }
        }

        let started_at = clock.now();
        let call = AssertUnwindSafe(worker(item.clone(), index)).catch_unwind();
        // tokio's timeout drops its timer when the inner future finishes,
        // on the success path as well as the failure path
        let settled = match config.per_item_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => settle(joined),
                Err(_) => Settled::TimedOut,
            },
            None => settle(call.await),
        };
        let completed_at = clock.now();

        match settled {
            Settled::Success(value) => {
                attempts.push(Attempt {
                    number: attempt,
                    started_at,
                    completed_at,
                    outcome: AttemptOutcome::Success,
                });
                progress.record_success();
                return ItemReport {
                    index,
                    attempts,
                    outcome: ItemOutcome::Succeeded(value),
                };
            }
            Settled::Failed(err) => {
                attempts.push(Attempt {
                    number: attempt,
                    started_at,
                    completed_at,
                    outcome: AttemptOutcome::Failure,
                });
                last_error = err;
            }
            Settled::TimedOut => {
                attempts.push(Attempt {
                    number: attempt,
                    started_at,
                    completed_at,
                    outcome: AttemptOutcome::Timeout,
                });
                last_error = None;
            }
        }
    }

    progress.record_failure();
    ItemReport {
        index,
        attempts,
        outcome: ItemOutcome::Failed { last_error },
    }
}

fn settle<R, E>(
    joined: std::result::Result<std::result::Result<R, E>, Box<dyn std::any::Any + Send>>,
) -> Settled<R, E> {
    match joined {
        Ok(Ok(value)) => Settled::Success(value),
        Ok(Err(err)) => Settled::Failed(Some(err)),
        Err(_) => {
            warn!("batch worker panicked; recording attempt as failed");
            Settled::Failed(None)
        }
    }
}

/// Delay before the given 1-based retry: `backoff_base * 2^(retry-1)`,
/// plus up to half that again when jitter is enabled.
fn backoff_delay(config: &BatchConfig, retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    let mut delay = config.backoff_base * 2u32.pow(exp);
    if config.jitter {
        let half = delay.as_millis() as u64 / 2;
        if half > 0 {
            delay += Duration::from_millis(rand::thread_rng().gen_range(0..=half));
        }
    }
    delay
}
