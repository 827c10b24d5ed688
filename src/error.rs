//! Error types for the concurrency primitives
//!
//! Provides unified error handling using thiserror.
//!
//! Expected outcomes are never errors: a cache miss is `None`, a rate-limit
//! deny is a [`Decision`](crate::limiter::Decision), and a batch item that
//! exhausts its retries settles as a terminal
//! [`ItemOutcome::Failed`](crate::batch::ItemOutcome). Only programmer errors
//! (bad construction parameters, semaphore misuse) and interrupted waits
//! surface through this type.

use std::time::Duration;

use thiserror::Error;

// == Error Enum ==
/// Unified error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction parameters; raised at build time, never clamped
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A semaphore permit was released without a matching acquire
    #[error("Semaphore released without a matching acquire")]
    CapacityMisuse,

    /// A waiter was cancelled before a permit became available
    #[error("Cancelled while waiting")]
    Cancelled,

    /// An operation exceeded its time limit
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
