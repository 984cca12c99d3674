//! Configuration loading and management

mod loader;

pub use loader::{RetryConfig, ENV_DELAY_MS, ENV_MAX_ATTEMPTS, ENV_TIMEOUT_MS};
