//! # Retry Logic and Backoff Strategies
//!
//! A standalone retry loop for remote calls. Each attempt is bounded by a
//! timeout that surfaces as a distinct [`AttemptError::TimedOut`], and a
//! [`LinearBackoff`] decides how long to wait between attempts. Errors the
//! caller marks as permanent end the loop early. Nothing in here knows about
//! profiles.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use whogofixam::client::offline::retry::{retry_with_timeout, LinearBackoff, RetryPolicy};
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, Duration::from_secs(10), LinearBackoff {
//!     base: Duration::from_secs(2),
//! });
//! let result: Result<u32, _> = retry_with_timeout(&policy, "example", |attempt| async move {
//!     if attempt < 2 { Err("not yet") } else { Ok(attempt) }
//! })
//! .await;
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::shared::AppConfig;

/// Delay between consecutive attempts: `base × attempt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub base: Duration,
}

impl LinearBackoff {
    /// Delay after the failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt.max(1))
    }
}

/// Attempt budget, per-attempt timeout and backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: LinearBackoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration, backoff: LinearBackoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            backoff,
        }
    }

    /// Policy for foreground profile fetches
    pub fn foreground(config: &AppConfig) -> Self {
        Self::new(
            config.fetch_attempts,
            config.fetch_timeout(),
            LinearBackoff {
                base: config.backoff_base(),
            },
        )
    }

    /// Policy for silent background refreshes
    pub fn background(config: &AppConfig) -> Self {
        Self::new(
            config.refresh_attempts,
            config.fetch_timeout(),
            LinearBackoff {
                base: config.backoff_base(),
            },
        )
    }
}

/// Why a single attempt failed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttemptError<E> {
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
    #[error("{0}")]
    Failed(E),
}

impl<E> AttemptError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::TimedOut(_))
    }
}

/// Run `operation` until it succeeds or the policy is exhausted
///
/// The closure receives the 1-based attempt number. The error of the last
/// attempt is returned on exhaustion.
pub async fn retry_with_timeout<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    operation: F,
) -> Result<T, AttemptError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_while(policy, label, operation, |_| true).await
}

/// Like [`retry_with_timeout`], but gives up at the first error for which
/// `should_retry` returns false. Timeouts are always retried.
pub async fn retry_while<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, AttemptError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        tracing::debug!(label, attempt, attempts, "starting attempt");
        let error = match tokio::time::timeout(policy.attempt_timeout, operation(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.attempt_timeout),
        };

        tracing::warn!(label, attempt, attempts, error = %error, "attempt failed");
        let retryable = match &error {
            AttemptError::Failed(e) => should_retry(e),
            AttemptError::TimedOut(_) => true,
        };
        if !retryable {
            tracing::debug!(label, attempt, "error is permanent, not retrying");
            return Err(error);
        }
        if attempt >= attempts {
            return Err(error);
        }

        let delay = policy.backoff.delay_after(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}
