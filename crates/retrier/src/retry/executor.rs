//! Retry execution engine
//!
//! [`Retry`] runs the attempt loop on its own tokio task. Both invocation
//! modes go through [`Retry::spawn`]: [`Retry::run`] is `spawn` followed by an
//! immediate [`RetryHandle::wait`], so there is a single loop implementation.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::types::{ResolvedPolicy, RetryPolicy};

use super::error::{Interruption, RetryError};
use super::handle::RetryHandle;
use super::observer::{NoOpObserver, RetryObserver};
use super::scope::Scope;
use super::strategies::{calculate_delay, AlwaysRetry, ClosurePredicate, RetryPredicate};

/// Run `op` under `policy` with the default predicate and no observer
///
/// ```rust,no_run
/// use retrier::retry::retry_with_policy;
/// use retrier::types::RetryPolicy;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///
///     let result = retry_with_policy(&policy, |_ctx| async {
///         Ok::<_, std::io::Error>("success")
///     })
///     .await;
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    Retry::new(policy).execute(op).await
}

/// Builder for configuring a [`Retry`]
///
/// ```rust
/// use retrier::retry::{RetryBuilder, TracingObserver};
/// use retrier::types::{MaxAttempts, RetryPolicy};
///
/// let retry = RetryBuilder::new()
///     .with_policy(RetryPolicy::new().with_max_attempts(MaxAttempts::Limited(5)))
///     .with_predicate_fn(|err: &std::io::Error| err.kind() != std::io::ErrorKind::NotFound)
///     .with_observer(TracingObserver::new("download"))
///     .build();
/// ```
pub struct RetryBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
}

impl Default for RetryBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryBuilder<AlwaysRetry, NoOpObserver> {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
        }
    }
}

impl<P, O> RetryBuilder<P, O> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the continuation predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryBuilder<P2, O> {
        RetryBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
        }
    }

    /// Set the continuation predicate from a closure
    pub fn with_predicate_fn<E, F>(self, predicate: F) -> RetryBuilder<ClosurePredicate<F>, O>
    where
        F: Fn(&E) -> bool + Send + Sync,
    {
        self.with_predicate(ClosurePredicate::new(predicate))
    }

    pub fn with_observer<O2>(self, observer: O2) -> RetryBuilder<P, O2> {
        RetryBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
        }
    }

    /// Resolve the policy and build the executor
    pub fn build(self) -> Retry<P, O> {
        Retry {
            policy: self.policy.resolve(),
            predicate: Arc::new(self.predicate),
            observer: Arc::new(self.observer),
        }
    }
}

/// A retry executor with a resolved policy, a predicate and an observer
///
/// Cheap to clone; clones share the predicate and observer.
pub struct Retry<P = AlwaysRetry, O = NoOpObserver> {
    policy: ResolvedPolicy,
    predicate: Arc<P>,
    observer: Arc<O>,
}

impl<P, O> Clone for Retry<P, O> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            predicate: Arc::clone(&self.predicate),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl Default for Retry<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        RetryBuilder::new().build()
    }
}

impl Retry<AlwaysRetry, NoOpObserver> {
    /// Executor for `policy` with the default predicate and no observer
    pub fn new(policy: &RetryPolicy) -> Self {
        RetryBuilder::new().with_policy(policy.clone()).build()
    }
}

impl<P, O> Retry<P, O> {
    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }
}

impl<P, O> Retry<P, O>
where
    O: RetryObserver + 'static,
{
    /// Start the attempt loop in the background
    ///
    /// The loop runs under a child of `scope`: cancelling `scope` stops it at
    /// its next decision point. Must be called from within a tokio runtime.
    pub fn spawn<F, Fut, T, E>(&self, scope: &CancellationToken, op: F) -> RetryHandle<T, E>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        P: RetryPredicate<E> + 'static,
    {
        let token = scope.child_token();
        let engine = self.clone();
        let loop_token = token.clone();

        tracing::debug!(
            max_attempts = %self.policy.max_attempts,
            timeout_ms = self.policy.timeout.as_millis() as u64,
            "spawning retry loop"
        );

        let task = tokio::spawn(async move { engine.drive(loop_token, op).await });
        RetryHandle::new(task, token)
    }

    /// Run to completion under the caller's `scope`
    pub async fn run<F, Fut, T, E>(&self, scope: &CancellationToken, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        P: RetryPredicate<E> + 'static,
    {
        self.spawn(scope, op).wait().await
    }

    /// Run to completion with no outer cancellation scope
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
        P: RetryPredicate<E> + 'static,
    {
        self.run(&CancellationToken::new(), op).await
    }

    /// The attempt loop
    ///
    /// After each failed attempt, in order: deadline/cancellation, predicate
    /// veto, attempt budget, then an interruptible delay. A successful
    /// attempt always wins, even if the deadline passed while it ran.
    async fn drive<F, Fut, T, E>(&self, token: CancellationToken, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: RetryPredicate<E>,
    {
        let policy = self.policy;
        let scope = Scope::new(token, policy.timeout);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            self.observer.on_attempt_start(attempt, policy.max_attempts);

            let err = match scope.attempt(op(scope.token())).await {
                Ok(value) => {
                    self.observer.on_success(attempt, scope.elapsed());
                    tracing::debug!(attempts = attempt, "retry loop succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if let Some(interruption) = scope.interruption() {
                return Err(self.interrupted(&scope, interruption, attempt, err));
            }

            if !self.predicate.should_retry(&err) {
                self.observer.on_rejected(attempt, &err);
                return Err(RetryError::non_retryable(attempt, err));
            }

            if policy.max_attempts.is_reached(attempt) {
                self.observer.on_exhausted(attempt, &err);
                return Err(RetryError::exhausted(attempt, err, scope.elapsed()));
            }

            let delay = calculate_delay(&policy, attempt);
            self.observer.on_attempt_failed(attempt, &err, delay);

            if let Err(interruption) = scope.sleep(delay).await {
                return Err(self.interrupted(&scope, interruption, attempt, err));
            }
        }
    }

    fn interrupted<E>(
        &self,
        scope: &Scope,
        interruption: Interruption,
        attempts: u32,
        last_error: E,
    ) -> RetryError<E> {
        let elapsed = scope.elapsed();
        self.observer.on_interrupted(attempts, interruption, elapsed);
        tracing::debug!(
            attempts = attempts,
            reason = %interruption,
            elapsed_ms = elapsed.as_millis() as u64,
            "retry loop interrupted"
        );
        RetryError::interrupted(interruption, attempts, self.policy.timeout, Some(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::observer::StatsObserver;
    use crate::types::MaxAttempts;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(MaxAttempts::Limited(max_attempts))
            .with_delay(Duration::from_millis(5))
            .with_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<&str, RetryError<io::Error>> = RetryBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(|_| async { Ok("success") })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let observer = Arc::new(StatsObserver::new());
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<&str, RetryError<io::Error>> = RetryBuilder::new()
            .with_policy(quick_policy(3))
            .with_observer(observer.clone())
            .build()
            .execute(move |_| {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 2 {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "timeout"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(observer.attempt_starts(), 2);
        assert_eq!(observer.failures(), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<(), RetryError<io::Error>> = RetryBuilder::new()
            .with_policy(quick_policy(1))
            .with_observer(observer.clone())
            .build()
            .execute(|_| async { Err(io::Error::other("single try")) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert_eq!(observer.failures(), 0);
        assert_eq!(observer.exhaustions(), 1);
    }

    #[tokio::test]
    async fn test_retry_with_policy_convenience() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = retry_with_policy(&quick_policy(3), move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 2 {
                    Err(io::Error::other("fail once"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_builder_resolves_policy() {
        let retry = RetryBuilder::new()
            .with_policy(RetryPolicy::new().with_max_attempts(MaxAttempts::Limited(0)))
            .build();

        assert_eq!(retry.policy().max_attempts, MaxAttempts::Limited(3));
        assert_eq!(retry.policy().delay, Duration::from_secs(5));
    }
}
