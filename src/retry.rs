//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd.
//!
//! - [`retry_with_backoff`] retries one operation a bounded number of times
//!   (used for container listings).
//! - [`Backoff`] produces a growing delay sequence for loops that retry forever
//!   until cancelled (used when the task store is unavailable).
//!
//! # Example
//!
//! ```no_run
//! use feishu_export::retry::{IsRetryable, retry_with_backoff};
//! use feishu_export::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! retry_with_backoff(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ProviderError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Feishu business code for "request trigger frequency limit"
const FEISHU_RATE_LIMITED: i64 = 99991400;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, rate limiting, server errors) should return `true`.
/// Permanent failures (permission denied, not found, malformed data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            // Rate limited or server side trouble
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Api { code, .. } => *code == FEISHU_RATE_LIMITED,
            ProviderError::Decode(_)
            | ProviderError::ExportFailed { .. }
            | ProviderError::ExportTimeout { .. }
            | ProviderError::Unsupported(_)
            | ProviderError::Write { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // A locked or busy SQLite file clears up on its own
            Error::Database(_) | Error::Sqlx(_) => true,
            Error::Config { .. }
            | Error::Task(_)
            | Error::Serialization(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error once `config.max_attempts`
/// retries are exhausted. Non-retryable errors are returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(jittered_delay).await;

                delay = next_delay(delay, config.backoff_multiplier, config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Unbounded exponential back-off sequence
///
/// Each call to [`Backoff::next_delay`] returns the current (jittered) delay and
/// doubles the base for the following call, capped at the maximum.
/// [`Backoff::reset`] starts over after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// Create a back-off starting at `initial` and capped at `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
            failures: 0,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = add_jitter(self.current).min(self.max);
        self.current = next_delay(self.current, 2.0, self.max);
        self.failures += 1;
        delay
    }

    /// Number of consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}

fn next_delay(delay: Duration, multiplier: f64, max: Duration) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * multiplier).min(max)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
