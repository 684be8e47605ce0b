//! Retry wrapper with linear backoff for rate-limited provider calls
//!
//! Only errors whose kind is [`ErrorKind::RateLimited`](crate::error::ErrorKind)
//! are retried. Everything else propagates on first occurrence.

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Result, TriageError};

/// Attempt ceiling and base delay for [`with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// Wait before retry number `attempt` (1-based): `base_delay × attempt`,
    /// saturating at `Duration::MAX`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

/// Linear schedule: base, 2×base, 3×base ... until the attempt ceiling
#[derive(Debug)]
struct LinearBackoff {
    policy: RetryPolicy,
    failures: u32,
}

impl LinearBackoff {
    fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            None
        } else {
            Some(self.policy.delay_for(self.failures))
        }
    }
}

/// Run `operation`, retrying rate-limited failures with linear backoff
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts;
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        LinearBackoff::new(*policy),
        || {
            let call = operation();
            async move {
                call.await.map_err(|e| {
                    if e.is_rate_limited() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |err: TriageError, wait: Duration| {
            attempt += 1;
            warn!(
                "{} rate limited (attempt {}/{}): {}. Retrying in {:?}...",
                operation_name, attempt, max_attempts, err, wait
            );
        },
    )
    .await
}
