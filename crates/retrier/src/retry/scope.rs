//! Deadline-bounded cancellable scope for one retry invocation
//!
//! The scope owns a child of the caller's [`CancellationToken`] and a single
//! deadline computed once when the invocation starts. Reaching the deadline
//! cancels the token, so operations watching their token see the same signal
//! whether the caller cancelled or the budget ran out.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::error::Interruption;

/// Used when `now + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) struct Scope {
    token: CancellationToken,
    started: Instant,
    deadline: Instant,
}

impl Scope {
    pub(crate) fn new(token: CancellationToken, timeout: Duration) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        Self {
            token,
            started,
            deadline,
        }
    }

    /// Token handed to each attempt
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check the scope at a decision point between attempts
    ///
    /// An elapsed deadline wins over a cancelled token.
    pub(crate) fn interruption(&self) -> Option<Interruption> {
        if Instant::now() >= self.deadline {
            self.token.cancel();
            Some(Interruption::TimedOut)
        } else if self.token.is_cancelled() {
            Some(Interruption::Cancelled)
        } else {
            None
        }
    }

    /// Drive one attempt to completion
    ///
    /// If the deadline passes while the attempt is in flight the token is
    /// cancelled, but the attempt keeps running until it returns on its own.
    pub(crate) async fn attempt<F: Future>(&self, fut: F) -> F::Output {
        tokio::pin!(fut);

        tokio::select! {
            biased;
            out = &mut fut => out,
            _ = time::sleep_until(self.deadline) => {
                self.token.cancel();
                fut.await
            }
        }
    }

    /// Sleep for `delay`, aborting as soon as the deadline or the token fires
    pub(crate) async fn sleep(&self, delay: Duration) -> Result<(), Interruption> {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return match self.interruption() {
                Some(interruption) => Err(interruption),
                None => Ok(()),
            };
        }

        let sleep = time::sleep(delay);
        tokio::pin!(sleep);

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.interruption().unwrap_or(Interruption::Cancelled)),
            _ = time::sleep_until(self.deadline) => {
                self.token.cancel();
                Err(Interruption::TimedOut)
            }
            _ = &mut sleep => Ok(()),
        }
    }
}
