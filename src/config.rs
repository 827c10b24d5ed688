//! Configuration Module
//!
//! Construction parameters for each component. Validation fails fast with
//! [`Error::InvalidConfig`](crate::error::Error::InvalidConfig); values are
//! never silently clamped.

use std::time::Duration;

use crate::error::{Error, Result};

// == Cache Config ==
/// Parameters for a [`BoundedCache`](crate::cache::BoundedCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold. Must be at least 1.
    pub max_entries: usize,
    /// Default TTL applied to entries stored without an explicit TTL.
    /// `None` means such entries never expire.
    pub default_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config with the given capacity and no default TTL.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            default_ttl: None,
        }
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.default_ttl == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "default_ttl must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Some(Duration::from_secs(300)),
        }
    }
}

// == Batch Config ==
/// Parameters for a [`BatchProcessor`](crate::batch::BatchProcessor).
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of items processed concurrently. Must be at least 1.
    pub concurrency: usize,
    /// Time limit applied to each worker invocation. `None` disables the
    /// per-item timeout.
    pub per_item_timeout: Option<Duration>,
    /// Number of retries after the first attempt fails or times out.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts. The delay before
    /// retry `n` is `backoff_base * 2^(n-1)`.
    pub backoff_base: Duration,
    /// Adds up to half the computed delay as random jitter when enabled.
    pub jitter: bool,
}

impl BatchConfig {
    /// Creates a config with the given concurrency limit and defaults for
    /// the remaining fields.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.per_item_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "per_item_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            per_item_timeout: Some(Duration::from_secs(30)),
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            jitter: false,
        }
    }
}

// == Rate Limiter Config ==
/// Parameters for a [`RateLimiter`](crate::limiter::RateLimiter).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Length of the fixed counting window. Must be positive.
    pub window: Duration,
    /// Number of requests allowed per key within one window. Must be at
    /// least 1.
    pub limit: u32,
}

impl RateLimiterConfig {
    /// Creates a config with the given window and limit.
    pub fn new(window: Duration, limit: u32) -> Self {
        Self { window, limit }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window == Duration::ZERO {
            return Err(Error::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        if self.limit == 0 {
            return Err(Error::InvalidConfig(
                "limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            limit: 100,
        }
    }
}
