//! Bounded retry with an explicit success predicate.
//!
//! [`retry_until`] re-invokes an async action while its *successful* result
//! fails a predicate — polling a rollout until the platform reports it
//! complete, for example. An `Err` from the action is never retried; it
//! propagates immediately. The combinator has no side effects of its own.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::error::ProvisionError;

/// Retry configuration for one retryable action.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (total, not retries after the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied per attempt; 1.0 means a fixed delay.
    pub backoff_factor: f64,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy: `max_attempts` attempts spaced by `delay`.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            backoff_factor: 1.0,
            max_delay: delay,
        }
    }

    /// Exponential-backoff policy capped at `max_delay`.
    #[must_use]
    pub fn backoff(max_attempts: u32, initial_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor: factor,
            max_delay: Duration::from_secs(120),
        }
    }

    /// Calculate the delay that follows a given zero-based attempt.
    ///
    /// The scaled delay is clamped to `0..=max_delay`; a negative factor
    /// (which can come in from configuration) must not panic in
    /// `Duration::from_secs_f64`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.min(30)).unwrap_or(30);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Failure modes of [`retry_until`].
#[derive(Debug, Error)]
pub enum RetryError<T> {
    /// The success condition was never met within the attempt budget.
    #[error("success condition not met after {attempts} attempts")]
    Exhausted {
        /// Attempts consumed.
        attempts: u32,
        /// Last result observed before giving up.
        last: T,
    },

    /// The action itself failed; not retried.
    #[error(transparent)]
    Action(ProvisionError),
}

impl<T: std::fmt::Display> RetryError<T> {
    /// Flatten into the run-level error taxonomy.
    #[must_use]
    pub fn into_provision_error(self) -> ProvisionError {
        match self {
            Self::Exhausted { attempts, last } => ProvisionError::RetriesExhausted {
                attempts,
                last: last.to_string(),
            },
            Self::Action(e) => e,
        }
    }
}

/// Invoke `action` until `is_success` accepts its result, up to
/// `policy.max_attempts` attempts with the policy's delay between attempts.
///
/// # Errors
///
/// Returns [`RetryError::Action`] immediately if the action fails, or
/// [`RetryError::Exhausted`] carrying the last observed result once the
/// attempt budget is spent.
pub async fn retry_until<T, F, Fut, P>(
    policy: &RetryPolicy,
    mut action: F,
    is_success: P,
) -> Result<T, RetryError<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
    P: Fn(&T) -> bool,
{
    debug_assert!(policy.max_attempts > 0, "retry policy needs at least one attempt");

    let mut last = None;

    for attempt in 0..policy.max_attempts {
        let result = action().await.map_err(RetryError::Action)?;

        if is_success(&result) {
            return Ok(result);
        }

        last = Some(result);

        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay_for_attempt(attempt);
            debug!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                delay_secs = delay.as_secs(),
                "Result not yet successful, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    // max_attempts > 0, so last was set on the final unsuccessful attempt.
    match last {
        Some(last) => Err(RetryError::Exhausted {
            attempts: policy.max_attempts,
            last,
        }),
        None => Err(RetryError::Action(ProvisionError::configuration(
            "retry",
            "retry policy allowed zero attempts",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_action(
        calls: &AtomicU32,
        succeed_on: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<&'static str, ProvisionError>> + '_ {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(if n >= succeed_on { "done" } else { "pending" }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_m_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(20));

        let result = retry_until(&policy, counting_action(&calls, 3), |r| *r == "done")
            .await
            .unwrap();

        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_carries_last_result() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(4, Duration::from_secs(20));

        let err = retry_until(&policy, counting_action(&calls, 100), |r| *r == "done")
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "pending");
            }
            RetryError::Action(e) => panic!("unexpected action error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_action_error_aborts_after_one_invocation() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(10, Duration::from_secs(20));

        let err = retry_until(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<&str, _>(ProvisionError::transport(
                    "rollout-status",
                    "connection refused",
                )))
            },
            |_| true,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, RetryError::Action(ProvisionError::Transport { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_policy_spacing() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_secs(20));
        let start = tokio::time::Instant::now();

        let _ = retry_until(&policy, counting_action(&calls, 3), |r| *r == "done").await;

        // Two sleeps of 20s between three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_delays_are_capped() {
        let policy = RetryPolicy::backoff(10, Duration::from_secs(5), 2.0);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
        assert!(policy.delay_for_attempt(100) <= policy.max_delay);
    }

    #[test]
    fn test_negative_factor_clamps_to_zero_instead_of_panicking() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            backoff_factor: -2.0,
            max_delay: Duration::from_secs(120),
        };

        // Odd exponents go negative; clamp rather than panic.
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(20));
    }

    #[test]
    fn test_factor_one_means_fixed_delay() {
        let policy = RetryPolicy::fixed(60, Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(20));
        assert_eq!(policy.delay_for_attempt(59), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_into_provision_error_preserves_last() {
        let policy = RetryPolicy::fixed(1, Duration::from_secs(1));
        let err = retry_until(&policy, || std::future::ready(Ok("progressing")), |_| false)
            .await
            .unwrap_err()
            .into_provision_error();

        match err {
            ProvisionError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert_eq!(last, "progressing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
