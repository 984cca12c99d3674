//! Retry execution engine with policy-based configuration
//!
//! # Features
//!
//! - One deadline per invocation, derived from the policy's timeout
//! - Cooperative cancellation through `tokio_util`'s `CancellationToken`
//! - Continuation predicates that can veto retries
//! - Fixed, linear and exponential delays with optional jitter
//! - Observable attempts via the `RetryObserver` trait
//! - Run-to-completion and start-now/wait-later invocation
//!
//! # Example
//!
//! ```rust,no_run
//! use retrier::retry::{retry_with_policy, RetryError};
//! use retrier::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry_with_policy(&policy, |ctx| async move {
//!         if ctx.is_cancelled() {
//!             return Err(std::io::Error::other("gave up"));
//!         }
//!         Ok("success".to_string())
//!     })
//!     .await
//! }
//! ```

mod error;
mod executor;
mod handle;
mod observer;
mod scope;
mod strategies;

pub use error::{Interruption, RetryError, UsageError};
pub use executor::{retry_with_policy, Retry, RetryBuilder};
pub use handle::{BackgroundRetry, RetryHandle};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, ClosurePredicate, MessagePredicate, NeverRetry, RetryPredicate,
};
