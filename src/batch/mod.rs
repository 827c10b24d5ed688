//! Batch Module
//!
//! Bounded-concurrency batch execution with retries, timeouts, progress
//! reporting, and cooperative cancellation.

mod processor;
mod progress;

// Re-export public types
pub use processor::{
    Attempt, AttemptOutcome, BatchJob, BatchProcessor, BatchReport, CancelFlag, ItemOutcome,
    ItemReport,
};
pub use progress::ProgressSnapshot;
