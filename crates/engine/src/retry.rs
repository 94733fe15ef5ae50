//! Backoff-retry executor.
//!
//! Every flaky network or program call in the keeper funnels through
//! [`execute`]. A [`RetryPolicy`] is a caller-owned value: policies are
//! never shared between invocations and concurrent executions are fully
//! independent.

use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Predicate<T> = Arc<dyn Fn(&Result<T, EngineError>) -> bool + Send + Sync>;
type AttemptHook<T> = Arc<dyn Fn(u32, &Result<T, EngineError>) + Send + Sync>;

/// Retry policy for one logical operation.
///
/// The default predicate retries iff the attempt returned an error.
/// Retrying on a successful-but-undesired result is an explicit opt-in
/// via [`RetryPolicy::retry_if`]; nothing installs such a predicate
/// implicitly. Program-error retries are named separately through
/// [`RetryPolicy::retry_program_errors`] and consulted by the
/// submission layer only.
pub struct RetryPolicy<T> {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
    predicate: Predicate<T>,
    retryable_program_errors: Vec<String>,
    after_attempt: Option<AttemptHook<T>>,
}

impl<T> Clone for RetryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            max_retries: self.max_retries,
            predicate: self.predicate.clone(),
            retryable_program_errors: self.retryable_program_errors.clone(),
            after_attempt: self.after_attempt.clone(),
        }
    }
}

impl<T> RetryPolicy<T> {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            predicate: Arc::new(|result| result.is_err()),
            retryable_program_errors: Vec::new(),
            after_attempt: None,
        }
    }

    /// Short policy for latency-sensitive calls (fee oracle, raw fetch).
    #[must_use]
    pub fn quick() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(1), 2)
    }

    /// Standard policy for submission paths.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10), 5)
    }

    /// Exactly one attempt, no retry.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }

    /// Replaces the retry predicate. Receives the whole attempt result,
    /// so it can also request a retry on an undesired success.
    #[must_use]
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Result<T, EngineError>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Names the program errors the submission layer may retry for this
    /// call site (e.g. a stale-timestamp error the caller can refresh
    /// its way out of).
    #[must_use]
    pub fn retry_program_errors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_program_errors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Observability hook fired after every attempt; never affects
    /// control flow.
    #[must_use]
    pub fn observe<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, &Result<T, EngineError>) + Send + Sync + 'static,
    {
        self.after_attempt = Some(Arc::new(hook));
        self
    }

    /// Whether the caller named this program error as retryable.
    #[must_use]
    pub fn program_error_retryable(&self, name: &str) -> bool {
        self.retryable_program_errors.iter().any(|n| n == name)
    }

    pub(crate) fn predicate(&self) -> Predicate<T> {
        self.predicate.clone()
    }
}

/// Delay slept after failed attempt `attempt` (0-indexed):
/// `min(base_delay * 2^attempt, max_delay)`.
#[must_use]
pub fn backoff_delay(base_delay: Duration, max_delay: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    base_delay.saturating_mul(factor).min(max_delay)
}

/// Runs `op` under `policy`.
///
/// Stops on the first result the predicate accepts. On exhaustion an
/// erroring result is wrapped in [`EngineError::RetriesExhausted`]; a
/// success the predicate kept rejecting is returned as-is (the last
/// value is never swallowed).
pub async fn execute<T, F, Fut>(policy: &RetryPolicy<T>, mut op: F) -> Result<T, EngineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = op(attempt).await;
        if let Some(hook) = &policy.after_attempt {
            hook(attempt, &result);
        }

        if !(policy.predicate)(&result) {
            return result;
        }

        if attempt >= policy.max_retries {
            return match result {
                Err(last) => Err(EngineError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(last),
                }),
                ok => ok,
            };
        }

        let delay = backoff_delay(policy.base_delay, policy.max_delay, attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_op(
        calls: Arc<AtomicU32>,
        fail_first: u32,
    ) -> impl FnMut(u32) -> std::pin::Pin<Box<dyn Future<Output = Result<u32, EngineError>> + Send>>
    {
        move |attempt| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < fail_first {
                    Err(EngineError::Network("flaky".into()))
                } else {
                    Ok(attempt)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_false_predicate_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::standard().retry_if(|_| false);

        let result = execute(&policy, counting_op(calls.clone(), 10)).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_count_never_exceeds_max_retries_plus_one() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::new(Duration::from_millis(10), Duration::from_secs(1), 3);

        let result = execute(&policy, counting_op(calls.clone(), 100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(EngineError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, EngineError::Network(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_retries_means_exactly_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::no_retry();

        let _ = execute(&policy, counting_op(calls.clone(), 100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::standard();

        let result = execute(&policy, counting_op(calls.clone(), 2)).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_success_is_explicit_opt_in() {
        // Retry while the successful result is below a threshold.
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::new(Duration::from_millis(1), Duration::from_millis(8), 5)
            .retry_if(|result| !matches!(result, Ok(v) if *v >= 2));

        let result = execute(&policy, counting_op(calls.clone(), 0)).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retry_on_success_returns_last_value() {
        let policy = RetryPolicy::<u32>::new(Duration::from_millis(1), Duration::from_millis(2), 2)
            .retry_if(|_| true);

        let result = execute(&policy, |attempt| async move { Ok(attempt) }).await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn after_attempt_hook_fires_every_attempt_without_affecting_outcome() {
        let observed = Arc::new(AtomicU32::new(0));
        let hook_counter = observed.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::<u32>::new(Duration::from_millis(1), Duration::from_secs(1), 2)
            .observe(move |_, _| {
                hook_counter.fetch_add(1, Ordering::SeqCst);
            });

        let result = execute(&policy, counting_op(calls, 1)).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_delay_doubles_and_clamps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);

        assert_eq!(backoff_delay(base, max, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, max, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, max, 5), max);
        assert_eq!(backoff_delay(base, max, 31), max);

        // Non-decreasing in the attempt index.
        let mut prev = Duration::ZERO;
        for attempt in 0..32 {
            let d = backoff_delay(base, max, attempt);
            assert!(d >= prev);
            prev = d;
        }
    }
}
