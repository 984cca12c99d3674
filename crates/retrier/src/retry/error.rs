//! Error types for the retry execution engine
//!
//! Exactly one of these reaches the caller per failed invocation. Operation
//! errors are carried verbatim; timeouts, cancellations and misuse of the
//! background API are synthesized by the engine and are always
//! distinguishable from them.

use std::error::Error;
use std::fmt;
use std::time::Duration;

use thiserror::Error as ThisError;

/// Misuse of the start/wait API of [`BackgroundRetry`](super::BackgroundRetry)
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    /// `wait` was called before `start`
    #[error("retry was never started")]
    NotStarted,

    /// `start` was called while a run is pending or after it completed
    #[error("retry was already started")]
    AlreadyStarted,

    /// `wait` was called after the result had been taken
    #[error("retry result was already consumed")]
    AlreadyConsumed,

    /// An earlier `wait` was dropped before the result arrived; the run was
    /// cancelled and its result discarded
    #[error("retry was abandoned by a dropped wait")]
    Abandoned,
}

/// Why the engine stopped before the operation succeeded or ran out of attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The overall timeout elapsed
    TimedOut,
    /// The caller's scope (or the handle) was cancelled
    Cancelled,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::TimedOut => write!(f, "timed out"),
            Interruption::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal error of a retry invocation
///
/// Generic over `E`, the error type of the operation being retried.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The attempt budget was used up; `source` is the final attempt's error
    Exhausted {
        attempts: u32,
        source: E,
        total_duration: Duration,
    },

    /// The continuation predicate refused to retry `source`
    NonRetryable { attempts: u32, source: E },

    /// The overall timeout elapsed before the operation succeeded
    TimedOut {
        attempts: u32,
        timeout: Duration,
        /// Error of the last completed attempt, if any
        last_error: Option<E>,
    },

    /// The caller's cancellation scope was cancelled
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
    },

    /// The background API was misused
    Usage(UsageError),

    /// The retry task ended without producing a result (panic or abort)
    Aborted { reason: String },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => write!(
                f,
                "retry exhausted after {} attempts over {:.2}s: {}",
                attempts,
                total_duration.as_secs_f64(),
                source
            ),
            RetryError::NonRetryable { attempts, source } => {
                write!(f, "non-retryable error on attempt {}: {}", attempts, source)
            }
            RetryError::TimedOut {
                attempts,
                timeout,
                last_error,
            } => {
                write!(
                    f,
                    "retry timed out after {}ms ({} attempts)",
                    timeout.as_millis(),
                    attempts
                )?;
                if let Some(err) = last_error {
                    write!(f, ": {}", err)?;
                }
                Ok(())
            }
            RetryError::Cancelled {
                attempts,
                last_error,
            } => {
                if let Some(err) = last_error {
                    write!(f, "retry cancelled after {} attempts: {}", attempts, err)
                } else {
                    write!(f, "retry cancelled after {} attempts", attempts)
                }
            }
            RetryError::Usage(err) => write!(f, "retry usage error: {}", err),
            RetryError::Aborted { reason } => write!(f, "retry task aborted: {}", reason),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::TimedOut {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::Cancelled {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::Usage(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> From<UsageError> for RetryError<E> {
    fn from(err: UsageError) -> Self {
        RetryError::Usage(err)
    }
}

impl<E> RetryError<E> {
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    pub fn non_retryable(attempts: u32, source: E) -> Self {
        RetryError::NonRetryable { attempts, source }
    }

    pub fn timed_out(attempts: u32, timeout: Duration, last_error: Option<E>) -> Self {
        RetryError::TimedOut {
            attempts,
            timeout,
            last_error,
        }
    }

    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        RetryError::Aborted {
            reason: reason.into(),
        }
    }

    /// Build the error for an interrupted run
    pub(crate) fn interrupted(
        interruption: Interruption,
        attempts: u32,
        timeout: Duration,
        last_error: Option<E>,
    ) -> Self {
        match interruption {
            Interruption::TimedOut => RetryError::timed_out(attempts, timeout, last_error),
            Interruption::Cancelled => RetryError::cancelled(attempts, last_error),
        }
    }

    /// Number of attempts made (0 for usage and abort errors)
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::NonRetryable { attempts, .. }
            | RetryError::TimedOut { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::Usage(_) | RetryError::Aborted { .. } => 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Timed out or cancelled, as opposed to a failure of the operation itself
    pub fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }

    pub fn interruption(&self) -> Option<Interruption> {
        match self {
            RetryError::TimedOut { .. } => Some(Interruption::TimedOut),
            RetryError::Cancelled { .. } => Some(Interruption::Cancelled),
            _ => None,
        }
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, RetryError::Usage(_))
    }

    pub fn usage(&self) -> Option<UsageError> {
        match self {
            RetryError::Usage(err) => Some(*err),
            _ => None,
        }
    }

    /// The last error reported by the operation, if any attempt completed
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::TimedOut { last_error, .. } | RetryError::Cancelled { last_error, .. } => {
                last_error.as_ref()
            }
            RetryError::Usage(_) | RetryError::Aborted { .. } => None,
        }
    }

    /// Consume and return the operation's last error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::TimedOut { last_error, .. } | RetryError::Cancelled { last_error, .. } => {
                last_error
            }
            RetryError::Usage(_) | RetryError::Aborted { .. } => None,
        }
    }

    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_duration,
            },
            RetryError::NonRetryable { attempts, source } => RetryError::NonRetryable {
                attempts,
                source: f(source),
            },
            RetryError::TimedOut {
                attempts,
                timeout,
                last_error,
            } => RetryError::TimedOut {
                attempts,
                timeout,
                last_error: last_error.map(f),
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
            RetryError::Usage(err) => RetryError::Usage(err),
            RetryError::Aborted { reason } => RetryError::Aborted { reason },
        }
    }
}
