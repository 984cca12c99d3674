//! Retry observation and logging
//!
//! The executor reports every state transition of the attempt loop to a
//! [`RetryObserver`]. [`TracingObserver`] turns them into `tracing` events.

use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::Interruption;
use crate::types::MaxAttempts;

/// Receives callbacks while an invocation runs
///
/// Callbacks are made from the task running the attempt loop.
pub trait RetryObserver: Send + Sync {
    /// An attempt is about to start (`attempt` is 1-indexed)
    fn on_attempt_start(&self, attempt: u32, max_attempts: MaxAttempts);

    /// An attempt failed and the next one is scheduled after `delay`
    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration);

    /// The operation succeeded
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// The attempt budget is used up
    fn on_exhausted(&self, attempts: u32, final_error: &dyn Display);

    /// The continuation predicate refused to retry
    fn on_rejected(&self, attempt: u32, error: &dyn Display) {
        let _ = (attempt, error);
    }

    /// The deadline elapsed or the scope was cancelled
    fn on_interrupted(&self, attempts: u32, interruption: Interruption, elapsed: Duration) {
        let _ = (attempts, interruption, elapsed);
    }
}

/// Does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: MaxAttempts) {}

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Display, _delay: Duration) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Display) {}
}

/// Logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_attempt_failed`: WARN
/// - `on_success`: INFO after retries, DEBUG on the first attempt
/// - `on_exhausted`: ERROR
/// - `on_rejected`: WARN
/// - `on_interrupted`: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    /// `operation` names the retried work in every log line
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: MaxAttempts) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            max_attempts = %max_attempts,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Display) {
        tracing::error!(
            operation = %self.operation,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_rejected(&self, attempt: u32, error: &dyn Display) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            "retry stopped by non-retryable error"
        );
    }

    fn on_interrupted(&self, attempts: u32, interruption: Interruption, elapsed: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempts = attempts,
            reason = %interruption,
            elapsed_ms = elapsed.as_millis() as u64,
            "retry interrupted"
        );
    }
}

/// Counts retry events; useful for tests and metrics
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    rejections: AtomicU32,
    interruptions: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn rejections(&self) -> u32 {
        self.rejections.load(Ordering::SeqCst)
    }

    pub fn interruptions(&self) -> u32 {
        self.interruptions.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: MaxAttempts) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Display, _delay: Duration) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Display) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_rejected(&self, _attempt: u32, _error: &dyn Display) {
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }

    fn on_interrupted(&self, _attempts: u32, _interruption: Interruption, _elapsed: Duration) {
        self.interruptions.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Arc<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: MaxAttempts) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration) {
        (**self).on_attempt_failed(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Display) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_rejected(&self, attempt: u32, error: &dyn Display) {
        (**self).on_rejected(attempt, error)
    }

    fn on_interrupted(&self, attempts: u32, interruption: Interruption, elapsed: Duration) {
        (**self).on_interrupted(attempts, interruption, elapsed)
    }
}
