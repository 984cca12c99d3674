//! Result delivery for background retries
//!
//! The loop's task writes its single result into the task's join slot, which
//! never blocks the producer even if nobody ever reads it. [`RetryHandle`] is
//! the reader side; [`BackgroundRetry`] wraps it in a start/wait API that
//! reports misuse as [`UsageError`] instead of blocking.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::mem;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::error::{RetryError, UsageError};
use super::executor::Retry;
use super::observer::{NoOpObserver, RetryObserver};
use super::strategies::{AlwaysRetry, RetryPredicate};

/// Owned handle to a running retry loop
///
/// Dropping the handle without waiting cancels the loop's scope, so the loop
/// stops at its next decision point instead of running on unobserved.
#[must_use = "dropping a RetryHandle cancels the retry"]
pub struct RetryHandle<T, E> {
    task: JoinHandle<Result<T, RetryError<E>>>,
    token: CancellationToken,
    guard: DropGuard,
}

impl<T, E> RetryHandle<T, E> {
    pub(crate) fn new(task: JoinHandle<Result<T, RetryError<E>>>, token: CancellationToken) -> Self {
        let guard = token.clone().drop_guard();
        Self { task, token, guard }
    }

    /// Wait for the loop's single result
    pub async fn wait(self) -> Result<T, RetryError<E>> {
        let RetryHandle { task, guard, .. } = self;

        let result = match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(RetryError::aborted(format!(
                "retry task panicked: {}",
                panic_message(err.into_panic().as_ref())
            ))),
            Err(_) => Err(RetryError::aborted("retry task was cancelled by the runtime")),
        };

        // the loop is finished; nothing left to cancel
        let _ = guard.disarm();
        result
    }

    /// Ask the loop to stop at its next decision point
    ///
    /// An attempt already in flight sees its token cancelled but is not
    /// interrupted; `wait` then returns [`RetryError::Cancelled`] unless that
    /// attempt succeeds.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the loop has produced its result
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Token of the loop's scope
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}

enum Slot<T, E> {
    Idle,
    Running(RetryHandle<T, E>),
    Consumed,
    Abandoned,
}

/// Marks the slot abandoned if a `wait` future is dropped mid-await
struct PendingWait<'a, T, E> {
    slot: &'a mut Slot<T, E>,
    armed: bool,
}

impl<T, E> Drop for PendingWait<'_, T, E> {
    fn drop(&mut self) {
        if self.armed {
            *self.slot = Slot::Abandoned;
        }
    }
}

/// A retry executor that owns one background run
///
/// `start` begins the run and returns immediately; `wait` collects the
/// result. Each instance supports exactly one start and one wait:
///
/// - `wait` before `start` returns [`UsageError::NotStarted`]
/// - a second `start` returns [`UsageError::AlreadyStarted`]
/// - a second `wait` returns [`UsageError::AlreadyConsumed`]
///
/// If a `wait` future is dropped before it completes, the run is cancelled
/// and its result is lost; every later `wait` returns
/// [`UsageError::Abandoned`].
///
/// ```rust
/// use retrier::retry::{BackgroundRetry, Retry};
/// use retrier::types::RetryPolicy;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut job = BackgroundRetry::new(Retry::new(&RetryPolicy::default()));
/// job.start(&CancellationToken::new(), |_ctx| async { Ok::<_, std::io::Error>(42) })
///     .unwrap();
///
/// // ... other work ...
///
/// assert_eq!(job.wait().await.unwrap(), 42);
/// assert!(job.wait().await.unwrap_err().is_usage());
/// # }
/// ```
pub struct BackgroundRetry<T, E, P = AlwaysRetry, O = NoOpObserver> {
    retry: Retry<P, O>,
    slot: Slot<T, E>,
}

impl<T, E, P, O> BackgroundRetry<T, E, P, O> {
    pub fn new(retry: Retry<P, O>) -> Self {
        Self {
            retry,
            slot: Slot::Idle,
        }
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.slot, Slot::Idle)
    }

    /// Whether the result is ready to be collected without waiting
    pub fn is_finished(&self) -> bool {
        match &self.slot {
            Slot::Running(handle) => handle.is_finished(),
            Slot::Idle | Slot::Consumed | Slot::Abandoned => false,
        }
    }

    /// Cancel a pending run; no-op if none is pending
    pub fn cancel(&self) {
        if let Slot::Running(handle) = &self.slot {
            handle.cancel();
        }
    }
}

impl<T, E, P, O> BackgroundRetry<T, E, P, O>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    P: RetryPredicate<E> + 'static,
    O: RetryObserver + 'static,
{
    /// Begin the run in the background under `scope`
    pub fn start<F, Fut>(&mut self, scope: &CancellationToken, op: F) -> Result<(), UsageError>
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if self.is_started() {
            return Err(UsageError::AlreadyStarted);
        }

        self.slot = Slot::Running(self.retry.spawn(scope, op));
        Ok(())
    }

    /// Wait for the result of the run begun by `start`
    pub async fn wait(&mut self) -> Result<T, RetryError<E>> {
        match mem::replace(&mut self.slot, Slot::Consumed) {
            Slot::Running(handle) => {
                let mut pending = PendingWait {
                    slot: &mut self.slot,
                    armed: true,
                };
                let result = handle.wait().await;
                pending.armed = false;
                result
            }
            Slot::Idle => {
                self.slot = Slot::Idle;
                Err(UsageError::NotStarted.into())
            }
            Slot::Consumed => Err(UsageError::AlreadyConsumed.into()),
            Slot::Abandoned => {
                self.slot = Slot::Abandoned;
                Err(UsageError::Abandoned.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::error::Interruption;
    use crate::retry::executor::RetryBuilder;
    use crate::types::{MaxAttempts, RetryPolicy};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn one_shot() -> Retry {
        Retry::new(&RetryPolicy::new().with_max_attempts(MaxAttempts::Limited(1)))
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        let mut job: BackgroundRetry<u32, io::Error> = BackgroundRetry::new(one_shot());

        let err = job.wait().await.unwrap_err();
        assert_eq!(err.usage(), Some(UsageError::NotStarted));
        // still startable afterwards
        assert!(!job.is_started());
        job.start(&CancellationToken::new(), |_| async { Ok(1) })
            .unwrap();
        assert_eq!(job.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_double_start() {
        let mut job = BackgroundRetry::new(one_shot());
        let scope = CancellationToken::new();

        job.start(&scope, |_| async { Ok::<_, io::Error>("first") })
            .unwrap();
        let second = job.start(&scope, |_| async { Ok::<_, io::Error>("second") });

        assert_eq!(second, Err(UsageError::AlreadyStarted));
        assert_eq!(job.wait().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_double_wait() {
        let mut job = BackgroundRetry::new(one_shot());
        job.start(&CancellationToken::new(), |_| async { Ok::<_, io::Error>(7) })
            .unwrap();

        assert_eq!(job.wait().await.unwrap(), 7);
        let err = job.wait().await.unwrap_err();
        assert_eq!(err.usage(), Some(UsageError::AlreadyConsumed));

        // start after consumption is also refused
        let again = job.start(&CancellationToken::new(), |_| async { Ok(8) });
        assert_eq!(again, Err(UsageError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_panicking_operation_is_reported() {
        let handle = one_shot().spawn(&CancellationToken::new(), |_| async {
            if true {
                panic!("operation blew up");
            }
            Ok::<(), io::Error>(())
        });

        let err = handle.wait().await.unwrap_err();
        match err {
            RetryError::Aborted { reason } => assert!(reason.contains("operation blew up")),
            other => panic!("Expected Aborted, got {:?}", other),
        }
    }

    /// Records how the loop was interrupted
    #[derive(Default)]
    struct InterruptionLog {
        attempts: AtomicU32,
        last: Mutex<Option<Interruption>>,
    }

    impl RetryObserver for InterruptionLog {
        fn on_attempt_start(&self, _attempt: u32, _max_attempts: MaxAttempts) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Display, _delay: Duration) {}

        fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

        fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Display) {}

        fn on_interrupted(&self, _attempts: u32, interruption: Interruption, _elapsed: Duration) {
            *self.last.lock().unwrap() = Some(interruption);
        }
    }

    fn stalled_retry(log: Arc<InterruptionLog>) -> Retry<AlwaysRetry, Arc<InterruptionLog>> {
        RetryBuilder::new()
            .with_policy(
                RetryPolicy::new()
                    .with_max_attempts(MaxAttempts::Unlimited)
                    .with_delay(Duration::from_secs(60)),
            )
            .with_observer(log)
            .build()
    }

    async fn wait_for_interruption(log: &InterruptionLog) -> Interruption {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(interruption) = *log.last.lock().unwrap() {
                    return interruption;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("retry loop kept running")
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_loop() {
        let log = Arc::new(InterruptionLog::default());
        let handle = stalled_retry(log.clone()).spawn(&CancellationToken::new(), |_| async {
            Err::<(), _>(io::Error::other("down"))
        });
        let token = handle.cancellation_token();

        drop(handle);
        assert!(token.is_cancelled());

        // the loop leaves its 60s delay instead of running on
        assert_eq!(wait_for_interruption(&log).await, Interruption::Cancelled);
        assert_eq!(log.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_wait_abandons_run() {
        let log = Arc::new(InterruptionLog::default());
        let mut job = BackgroundRetry::new(stalled_retry(log.clone()));
        job.start(&CancellationToken::new(), |_| async {
            Err::<(), _>(io::Error::other("down"))
        })
        .unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(20), job.wait()).await;
        assert!(waited.is_err());

        assert_eq!(wait_for_interruption(&log).await, Interruption::Cancelled);
        let err = job.wait().await.unwrap_err();
        assert_eq!(err.usage(), Some(UsageError::Abandoned));
        // still abandoned on every later wait, and cannot be restarted
        assert_eq!(job.wait().await.unwrap_err().usage(), Some(UsageError::Abandoned));
        assert_eq!(
            job.start(&CancellationToken::new(), |_| async { Ok(()) }),
            Err(UsageError::AlreadyStarted)
        );
    }

    #[tokio::test]
    async fn test_is_finished() {
        let mut job = BackgroundRetry::new(one_shot());
        assert!(!job.is_finished());

        job.start(&CancellationToken::new(), |_| async { Ok::<_, io::Error>(()) })
            .unwrap();
        while !job.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(job.wait().await.is_ok());
    }
}
