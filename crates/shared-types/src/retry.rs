//! # Bounded Retry
//!
//! Every external call (chain RPC, settlement dispatch, store access) runs
//! under a per-call timeout and a fixed retry budget with capped exponential
//! backoff. Only errors classified as transient are retried.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::Classified;

/// Retry budget and timing for one class of external call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    pub max_backoff_ms: u64,
    /// Deadline for a single attempt.
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            call_timeout_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Fast policy for tests.
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            call_timeout_ms: 1_000,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self)
    }
}

/// Explicit attempt/backoff state for a supervised retry loop.
#[derive(Clone, Debug)]
pub struct Backoff {
    attempt: u32,
    max_attempts: u32,
    next_delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts.max(1),
            next_delay: Duration::from_millis(policy.initial_backoff_ms),
            max_delay: Duration::from_millis(policy.max_backoff_ms),
        }
    }

    /// Attempt number currently being made (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consume one attempt and return the delay before the next one,
    /// or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.next_delay.min(self.max_delay);
        self.attempt += 1;
        self.next_delay = (self.next_delay * 2).min(self.max_delay);
        Some(delay)
    }

    /// Start over after a success.
    pub fn reset(&mut self, policy: &RetryPolicy) {
        *self = Backoff::new(policy);
    }
}

/// A single attempt exceeded its deadline.
#[derive(Clone, Debug)]
pub struct CallTimeout {
    pub operation: &'static str,
    pub after: Duration,
}

impl fmt::Display for CallTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} timed out after {:?}", self.operation, self.after)
    }
}

/// Run `op` under the policy's timeout and retry budget.
///
/// Non-retryable errors return immediately; retryable ones are retried until
/// the budget is spent, then the last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classified + From<CallTimeout> + fmt::Display,
{
    let mut backoff = policy.backoff();
    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(E::from(CallTimeout {
                operation,
                after: policy.call_timeout(),
            })),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.class().is_retryable() {
            return Err(err);
        }

        let attempt = backoff.attempt();
        match backoff.next_delay() {
            Some(delay) => {
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retryable failure: {}",
                    err
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
            call_timeout_ms: 1_000,
        };
        let mut backoff = policy.backoff();
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 300, 300]);
        assert!(backoff.is_exhausted());
    }

    #[test]
    fn test_backoff_reset() {
        let policy = RetryPolicy::for_testing();
        let mut backoff = policy.backoff();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);
        backoff.reset(&policy);
        assert_eq!(backoff.attempt(), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, GatewayError> =
            retry_with_backoff(&RetryPolicy::for_testing(), "release_funds", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(GatewayError::Transport("reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GatewayError> =
            retry_with_backoff(&RetryPolicy::for_testing(), "release_funds", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::Rejected("already released".into())) }
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GatewayError> =
            retry_with_backoff(&RetryPolicy::for_testing(), "release_funds", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::Transport("down".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_error() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::for_testing()
        };
        let result: Result<(), GatewayError> = retry_with_backoff(&policy, "slow_call", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GatewayError::Timeout(_))));
    }
}
