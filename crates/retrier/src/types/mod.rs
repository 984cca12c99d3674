//! Type definitions for retry policies

mod policy;

pub use policy::{
    MaxAttempts, ResolvedPolicy, RetryPolicy, RetryStrategy, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT,
};
