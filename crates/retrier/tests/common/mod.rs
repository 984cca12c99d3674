//! Common test infrastructure for retrier integration tests
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::future::{ready, Ready};
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use retrier::CancellationToken;
use tracing_subscriber::EnvFilter;

pub const SUCCESS: &str = "success";

/// Install a test-friendly subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retrier=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Counts calls and fails until a chosen call number
#[derive(Debug, Clone, Default)]
pub struct FlakyOperation {
    calls: Arc<AtomicU32>,
    succeed_on: Option<u32>,
}

impl FlakyOperation {
    /// Succeeds on call `n` and every call after it
    pub fn succeeding_on(n: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            succeed_on: Some(n),
        }
    }

    pub fn always_failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The closure handed to the executor
    pub fn op(
        &self,
    ) -> impl FnMut(CancellationToken) -> Ready<Result<&'static str, io::Error>> + Send + 'static
    {
        let calls = self.calls.clone();
        let succeed_on = self.succeed_on;
        move |_| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            ready(match succeed_on {
                Some(n) if call >= n => Ok(SUCCESS),
                _ => Err(io::Error::other(format!("call {} failed", call))),
            })
        }
    }
}
