//! Retry delay strategies and continuation predicates

use crate::types::{ResolvedPolicy, RetryStrategy};
use rand::Rng;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Calculate the delay before the attempt after `attempt`
///
/// `attempt` is the 1-indexed number of the attempt that just failed.
///
/// ```rust
/// use retrier::retry::calculate_delay;
/// use retrier::types::{RetryPolicy, RetryStrategy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_strategy(RetryStrategy::Exponential)
///     .with_delay(Duration::from_millis(100))
///     .resolve();
///
/// assert_eq!(calculate_delay(&policy, 1), Duration::from_millis(100));
/// assert_eq!(calculate_delay(&policy, 3), Duration::from_millis(400));
/// ```
pub fn calculate_delay(policy: &ResolvedPolicy, attempt: u32) -> Duration {
    // zero means immediate retry under every strategy
    if policy.delay.is_zero() {
        return Duration::ZERO;
    }

    let attempt = attempt.max(1);

    let base = match policy.strategy {
        RetryStrategy::Fixed => policy.delay,
        RetryStrategy::Linear => policy.delay.saturating_mul(attempt),
        RetryStrategy::Exponential => {
            let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
            let secs = policy.delay.as_secs_f64() * policy.backoff_multiplier.powi(exponent);
            if secs.is_finite() {
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            } else {
                Duration::MAX
            }
        }
    };

    let capped = match policy.max_delay {
        Some(max) => base.min(max),
        None => base,
    };

    // up to 25% on top of the capped delay
    if policy.jitter && !capped.is_zero() {
        let range = u64::try_from(capped.as_millis() / 4).unwrap_or(u64::MAX);
        let extra = rand::rng().random_range(0..=range);
        capped.saturating_add(Duration::from_millis(extra))
    } else {
        capped
    }
}

/// Decides, per failed attempt, whether retrying is allowed at all
///
/// Returning `false` stops the invocation immediately, even when attempts
/// and time remain.
///
/// ```rust
/// use retrier::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct TransientIo;
///
/// impl RetryPredicate<Error> for TransientIo {
///     fn should_retry(&self, error: &Error) -> bool {
///         !matches!(
///             error.kind(),
///             ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
///         )
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;
}

/// Every error is retryable (the default)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// No error is retryable; the operation runs once
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// Adapts a closure into a [`RetryPredicate`]
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Retries only errors whose message contains one of the given patterns
///
/// Matching is case-insensitive.
#[derive(Debug, Clone)]
pub struct MessagePredicate {
    retryable_patterns: Vec<String>,
}

impl MessagePredicate {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            retryable_patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }

    /// Common transient network failures
    pub fn network_errors() -> Self {
        Self::new([
            "timeout",
            "timed out",
            "connection reset",
            "connection refused",
            "network unreachable",
            "temporary failure",
        ])
    }
}

impl<E: Display + ?Sized> RetryPredicate<E> for MessagePredicate {
    fn should_retry(&self, error: &E) -> bool {
        let message = error.to_string().to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| message.contains(pattern))
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Arc<P> {
    fn should_retry(&self, error: &E) -> bool {
        (**self).should_retry(error)
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Box<P> {
    fn should_retry(&self, error: &E) -> bool {
        (**self).should_retry(error)
    }
}
