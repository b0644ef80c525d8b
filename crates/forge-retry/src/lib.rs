//! Generic retry engine (`spec.md` §4.4): retries an operation until it
//! succeeds, fails with a non-retryable error, is cancelled, or exhausts
//! its policy's attempt budget. Classification is dispatch-by-`ForgeErrorKind`
//! (`ForgeError::is_retryable`), never string matching of error messages —
//! the same rule `forge-llm`'s `StageRouter` uses for fallback advancement.

use std::future::Future;
use std::time::Duration;

use forge_core::error::{ForgeError, ForgeErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A retry budget: how many attempts to make (initial attempt plus
/// retries) and the backoff schedule to apply before each retried
/// attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    schedule: Vec<Duration>,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, schedule: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            schedule,
        }
    }

    /// Build a policy from the stage's configured retry count and the
    /// pipeline's backoff schedule (`ForgeConfig::retry`).
    #[must_use]
    pub fn from_retries(retries: u32, schedule: Vec<Duration>) -> Self {
        Self::new(retries + 1, schedule)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff to apply before retry number `retry_index` (1-based: the
    /// wait before the second attempt is `retry_index == 1`). Attempts
    /// beyond the schedule's length reuse its last entry, per §4.4
    /// ("further retries cap at 1,500 ms").
    fn backoff_for(&self, retry_index: u32) -> Duration {
        if self.schedule.is_empty() {
            return Duration::ZERO;
        }
        let idx = (retry_index as usize - 1).min(self.schedule.len() - 1);
        self.schedule[idx]
    }
}

/// Notified before each retried attempt's backoff sleep, so the caller
/// (the orchestrator) can emit a `stage:retrying` event carrying the same
/// attempt/max-attempts/backoff/previous-error the engine just computed.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, attempt: u32, max_attempts: u32, backoff: Duration, previous_error: &ForgeError);
}

/// An observer that does nothing, for callers that don't need
/// `stage:retrying` events (most unit tests).
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _backoff: Duration, _previous_error: &ForgeError) {}
}

impl<F: Fn(u32, u32, Duration, &ForgeError) + Send + Sync> RetryObserver for F {
    fn on_retry(&self, attempt: u32, max_attempts: u32, backoff: Duration, previous_error: &ForgeError) {
        self(attempt, max_attempts, backoff, previous_error);
    }
}

/// Runs `op` until it returns `Ok`, a non-retryable error, a cancellation,
/// or `policy`'s attempt budget is exhausted.
///
/// `op` is invoked with the 1-based attempt number so it can build
/// per-attempt correlation metadata. Backoff is applied *before* the
/// retried attempt, not after the failure that triggered it — the
/// schedule's first entry is the wait before attempt 2.
pub async fn retry<F, Fut, T>(
    op: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    observer: &dyn RetryObserver,
) -> Result<T, ForgeError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    let mut attempt: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(ForgeError::new(ForgeErrorKind::Cancelled));
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if cancel.is_cancelled() {
                    return Err(ForgeError::new(ForgeErrorKind::Cancelled));
                }

                let max_attempts = effective_max_attempts(policy, &err);
                if !err.is_retryable() || attempt >= max_attempts {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "retry budget exhausted or error not retryable"
                    );
                    return Err(err.with_attempt_count(attempt));
                }

                let backoff = policy.backoff_for(attempt);
                observer.on_retry(attempt, max_attempts, backoff, &err);
                debug!(attempt, ?backoff, "backing off before retry");

                if backoff > Duration::ZERO {
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = cancel.cancelled() => {
                            return Err(ForgeError::new(ForgeErrorKind::Cancelled));
                        }
                    }
                }

                attempt += 1;
            }
        }
    }
}

/// The attempt budget actually in force for this failure: the stage's own
/// `policy.max_attempts()`, tightened to the error kind's own retry
/// ceiling when it has one (`ForgeErrorKind::max_retries`).
fn effective_max_attempts(policy: &RetryPolicy, err: &ForgeError) -> u32 {
    match err.kind.max_retries() {
        Some(ceiling) => policy.max_attempts().min(ceiling + 1),
        None => policy.max_attempts(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_retries(2, vec![Duration::from_millis(0), Duration::from_millis(5), Duration::from_millis(10)])
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_retrying() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ForgeError> = retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            },
            &policy(),
            &CancellationToken::new(),
            &NoopObserver,
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, ForgeError> = retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(ForgeError::new(ForgeErrorKind::RateLimit { retry_after: None }))
                    } else {
                        Ok("eventually")
                    }
                }
            },
            &policy(),
            &CancellationToken::new(),
            &NoopObserver,
        )
        .await;
        assert_eq!(result.unwrap(), "eventually");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_aborts_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ForgeError> = retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ForgeError::new(ForgeErrorKind::Authentication { message: "bad key".into() })) }
            },
            &policy(),
            &CancellationToken::new(),
            &NoopObserver,
        )
        .await;
        assert!(matches!(result.unwrap_err().kind, ForgeErrorKind::Authentication { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausting_budget_wraps_last_error_with_attempt_count() {
        let result: Result<(), ForgeError> = retry(
            |_attempt| async { Err(ForgeError::new(ForgeErrorKind::ProviderUnavailable { message: "down".into() })) },
            &policy(),
            &CancellationToken::new(),
            &NoopObserver,
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err.kind, ForgeErrorKind::ProviderUnavailable { .. }));
        assert_eq!(err.attempt_count, 3);
    }

    #[tokio::test]
    async fn observer_is_notified_before_each_retried_attempt() {
        let observations: Mutex<Vec<(u32, u32)>> = Mutex::new(Vec::new());
        let observer = |attempt: u32, max_attempts: u32, _backoff: Duration, _err: &ForgeError| {
            observations.lock().unwrap().push((attempt, max_attempts));
        };

        let _: Result<(), ForgeError> = retry(
            |_attempt| async { Err(ForgeError::new(ForgeErrorKind::Timeout { duration: Duration::from_secs(1) })) },
            &policy(),
            &CancellationToken::new(),
            &observer,
        )
        .await;

        assert_eq!(*observations.lock().unwrap(), vec![(1, 3), (2, 3)]);
    }

    #[tokio::test]
    async fn cancellation_before_first_attempt_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), ForgeError> = retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            &policy(),
            &cancel,
            &NoopObserver,
        )
        .await;

        assert!(matches!(result.unwrap_err().kind, ForgeErrorKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parse_failure_is_retried_at_most_once_regardless_of_stage_budget() {
        // `policy()` grants 3 attempts (2 retries), but `ParseFailure` caps
        // at one retry (`spec.md` §7 item 8), so only 2 calls should happen.
        let calls = AtomicU32::new(0);
        let result: Result<(), ForgeError> = retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ForgeError::new(ForgeErrorKind::ParseFailure { reason: "bad json".into() })) }
            },
            &policy(),
            &CancellationToken::new(),
            &NoopObserver,
        )
        .await;
        assert!(matches!(result.unwrap_err().kind, ForgeErrorKind::ParseFailure { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one retry, not the full 3-attempt stage budget");
    }

    #[tokio::test]
    async fn cancellation_during_backoff_short_circuits_before_next_attempt() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let long_backoff = RetryPolicy::from_retries(3, vec![Duration::from_secs(60)]);

        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel_clone.cancel();
        });

        let result: Result<(), ForgeError> = retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ForgeError::new(ForgeErrorKind::RateLimit { retry_after: None })) }
            },
            &long_backoff,
            &cancel,
            &NoopObserver,
        )
        .await;

        handle.await.unwrap();
        assert!(matches!(result.unwrap_err().kind, ForgeErrorKind::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
