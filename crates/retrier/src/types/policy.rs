//! Retry policy types
//!
//! A [`RetryPolicy`] is what callers write (in code or in YAML): every field is
//! optional. [`RetryPolicy::resolve`] merges it with the defaults and yields a
//! [`ResolvedPolicy`], which is what the executor actually runs with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default number of attempts when none is configured
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between a failed attempt and the next one
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Default overall budget for the whole sequence of attempts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Default multiplier for exponential backoff
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maximum number of attempts for one invocation
///
/// In configuration files and [`MaxAttempts::from_count`] the integer form is
/// used: any negative number (conventionally `-1`) means unlimited, `0` means
/// "not set" and resolves to [`DEFAULT_MAX_ATTEMPTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum MaxAttempts {
    /// Stop after this many attempts
    Limited(u32),
    /// Keep attempting until the timeout or a predicate veto
    Unlimited,
}

impl MaxAttempts {
    /// Build from the integer form (`-1` = unlimited)
    pub fn from_count(count: i64) -> Self {
        if count < 0 {
            MaxAttempts::Unlimited
        } else {
            MaxAttempts::Limited(u32::try_from(count).unwrap_or(u32::MAX))
        }
    }

    /// The attempt limit, or `None` when unlimited
    pub fn limit(&self) -> Option<u32> {
        match self {
            MaxAttempts::Limited(n) => Some(*n),
            MaxAttempts::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, MaxAttempts::Unlimited)
    }

    /// Whether `attempt` (1-indexed) used up the budget
    pub fn is_reached(&self, attempt: u32) -> bool {
        match self {
            MaxAttempts::Limited(n) => attempt >= *n,
            MaxAttempts::Unlimited => false,
        }
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        MaxAttempts::Limited(DEFAULT_MAX_ATTEMPTS)
    }
}

impl From<i64> for MaxAttempts {
    fn from(count: i64) -> Self {
        MaxAttempts::from_count(count)
    }
}

impl From<MaxAttempts> for i64 {
    fn from(attempts: MaxAttempts) -> Self {
        match attempts {
            MaxAttempts::Limited(n) => i64::from(n),
            MaxAttempts::Unlimited => -1,
        }
    }
}

impl fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxAttempts::Limited(n) => write!(f, "{}", n),
            MaxAttempts::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Same delay before every retry (default)
    #[default]
    Fixed,

    /// `delay * attempt`
    Linear,

    /// `delay * multiplier^(attempt - 1)`
    Exponential,
}

/// Caller-facing retry policy; unset fields fall back to the defaults
///
/// ```rust
/// use retrier::types::{MaxAttempts, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(MaxAttempts::Unlimited)
///     .with_timeout(Duration::from_secs(30));
///
/// let resolved = policy.resolve();
/// assert!(resolved.max_attempts.is_unlimited());
/// assert_eq!(resolved.delay, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts (`-1` = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<MaxAttempts>,

    /// Delay between attempts; an explicit zero means immediate retry
    #[serde(
        default,
        rename = "delay-ms",
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<Duration>,

    /// Total budget for all attempts
    #[serde(
        default,
        rename = "timeout-ms",
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,

    /// Delay growth strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RetryStrategy>,

    /// Multiplier for [`RetryStrategy::Exponential`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,

    /// Upper bound applied to computed delays
    #[serde(
        default,
        rename = "max-delay-ms",
        with = "millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_delay: Option<Duration>,

    /// Add up to 25% random jitter to each delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<bool>,
}

impl RetryPolicy {
    /// A policy with every field unset
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: MaxAttempts) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Fill unset fields with defaults
    ///
    /// Never fails. `Limited(0)` and a zero timeout count as unset; an
    /// explicit zero delay and `Unlimited` are kept as given.
    pub fn resolve(&self) -> ResolvedPolicy {
        let max_attempts = match self.max_attempts {
            None | Some(MaxAttempts::Limited(0)) => MaxAttempts::default(),
            Some(other) => other,
        };

        let timeout = match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        };

        let backoff_multiplier = match self.backoff_multiplier {
            Some(m) if m.is_finite() && m > 0.0 => m,
            _ => DEFAULT_BACKOFF_MULTIPLIER,
        };

        ResolvedPolicy {
            max_attempts,
            delay: self.delay.unwrap_or(DEFAULT_DELAY),
            timeout,
            strategy: self.strategy.unwrap_or_default(),
            backoff_multiplier,
            max_delay: self.max_delay,
            jitter: self.jitter.unwrap_or(false),
        }
    }

    /// Overlay `other` on top of `self`: fields set in `other` win
    pub fn merge(&self, other: &RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: other.max_attempts.or(self.max_attempts),
            delay: other.delay.or(self.delay),
            timeout: other.timeout.or(self.timeout),
            strategy: other.strategy.or(self.strategy),
            backoff_multiplier: other.backoff_multiplier.or(self.backoff_multiplier),
            max_delay: other.max_delay.or(self.max_delay),
            jitter: other.jitter.or(self.jitter),
        }
    }
}

/// A fully specified policy, read-only for the duration of one invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedPolicy {
    pub max_attempts: MaxAttempts,
    pub delay: Duration,
    pub timeout: Duration,
    pub strategy: RetryStrategy,
    pub backoff_multiplier: f64,
    pub max_delay: Option<Duration>,
    pub jitter: bool,
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        RetryPolicy::default().resolve()
    }
}

impl From<&RetryPolicy> for ResolvedPolicy {
    fn from(policy: &RetryPolicy) -> Self {
        policy.resolve()
    }
}

impl From<RetryPolicy> for ResolvedPolicy {
    fn from(policy: RetryPolicy) -> Self {
        policy.resolve()
    }
}

/// `Option<Duration>` as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
