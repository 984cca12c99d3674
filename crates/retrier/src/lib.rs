//! # retrier
//!
//! Retry executor for flaky async operations:
//! - Policy types with documented defaults (3 attempts, 5s delay, 24h timeout)
//! - Retry execution engine with deadlines, cancellation and predicates
//! - YAML / environment configuration of named retry policies

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::RetryConfig;
pub use error::{Error, Result};
pub use retry::{BackgroundRetry, Retry, RetryBuilder, RetryError, RetryHandle};
pub use types::{MaxAttempts, RetryPolicy};

/// Re-exported so callers can build scopes without depending on `tokio-util` directly
pub use tokio_util::sync::CancellationToken;
