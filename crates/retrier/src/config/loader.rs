//! Retry configuration loading
//!
//! Policies are loaded with the following precedence (low to high):
//! 1. Built-in defaults (see [`crate::types::RetryPolicy::resolve`])
//! 2. YAML file (`default` + per-operation `operations` map)
//! 3. Environment variables (`RETRIER_*` prefix, applied to `default`)

use crate::error::{Error, Result};
use crate::types::{MaxAttempts, RetryPolicy};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

/// Overrides `default.max-attempts` (`-1` = unlimited)
pub const ENV_MAX_ATTEMPTS: &str = "RETRIER_MAX_ATTEMPTS";
/// Overrides `default.delay-ms`
pub const ENV_DELAY_MS: &str = "RETRIER_DELAY_MS";
/// Overrides `default.timeout-ms`
pub const ENV_TIMEOUT_MS: &str = "RETRIER_TIMEOUT_MS";

/// Retry policies for a set of named operations
///
/// ```yaml
/// default:
///   max-attempts: 3
///   delay-ms: 500
/// operations:
///   download:
///     max-attempts: -1
///     timeout-ms: 60000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Policy used when an operation has no entry of its own
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation policies, layered over `default`
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryConfig {
    /// Load from a YAML file, then apply environment overrides
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let config = Self::from_path(path)?;
        config.apply_env_overrides()
    }

    /// Parse a YAML file
    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config_not_found(path.as_str()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse YAML content
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Apply `RETRIER_*` environment variables to the default policy
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = env::var(ENV_MAX_ATTEMPTS) {
            let count: i64 = val
                .trim()
                .parse()
                .map_err(|_| Error::invalid_env(ENV_MAX_ATTEMPTS, &val))?;
            self.default.max_attempts = Some(MaxAttempts::from_count(count));
        }

        if let Ok(val) = env::var(ENV_DELAY_MS) {
            self.default.delay = Some(parse_millis(ENV_DELAY_MS, &val)?);
        }

        if let Ok(val) = env::var(ENV_TIMEOUT_MS) {
            self.default.timeout = Some(parse_millis(ENV_TIMEOUT_MS, &val)?);
        }

        Ok(self)
    }

    /// Effective policy for `operation`
    ///
    /// Fields the operation leaves unset are taken from `default`.
    pub fn policy_for(&self, operation: &str) -> RetryPolicy {
        match self.operations.get(operation) {
            Some(policy) => self.default.merge(policy),
            None => self.default.clone(),
        }
    }
}

fn parse_millis(var: &str, val: &str) -> Result<Duration> {
    val.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| Error::invalid_env(var, val))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetryStrategy;
    use serial_test::serial;

    const SAMPLE: &str = r#"
default:
  max-attempts: 4
  delay-ms: 200
operations:
  download:
    max-attempts: -1
    timeout-ms: 60000
  ping:
    delay-ms: 0
"#;

    fn clear_env() {
        env::remove_var(ENV_MAX_ATTEMPTS);
        env::remove_var(ENV_DELAY_MS);
        env::remove_var(ENV_TIMEOUT_MS);
    }

    #[test]
    fn test_from_yaml_str() {
        let config = RetryConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.default.max_attempts, Some(MaxAttempts::Limited(4)));
        assert_eq!(config.operations.len(), 2);
    }

    #[test]
    fn test_policy_for_layers_over_default() {
        let config = RetryConfig::from_yaml_str(SAMPLE).unwrap();

        let download = config.policy_for("download");
        assert_eq!(download.max_attempts, Some(MaxAttempts::Unlimited));
        assert_eq!(download.delay, Some(Duration::from_millis(200)));
        assert_eq!(download.timeout, Some(Duration::from_secs(60)));

        let ping = config.policy_for("ping").resolve();
        assert_eq!(ping.delay, Duration::ZERO);
        assert_eq!(ping.max_attempts, MaxAttempts::Limited(4));

        let unknown = config.policy_for("upload");
        assert_eq!(unknown, config.default);
    }

    #[test]
    fn test_operation_resets_strategy_and_jitter() {
        let config = RetryConfig::from_yaml_str(
            r#"
default:
  strategy: exponential
  jitter: true
operations:
  health-check:
    strategy: fixed
    jitter: false
"#,
        )
        .unwrap();

        let check = config.policy_for("health-check").resolve();
        assert_eq!(check.strategy, RetryStrategy::Fixed);
        assert!(!check.jitter);

        let other = config.policy_for("upload").resolve();
        assert_eq!(other.strategy, RetryStrategy::Exponential);
        assert!(other.jitter);
    }

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config = RetryConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = RetryConfig::from_yaml_str("default: [1, 2").unwrap_err();
        assert!(matches!(err, Error::YamlParse(_)));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var(ENV_MAX_ATTEMPTS, "-1");
        env::set_var(ENV_DELAY_MS, "15");
        env::set_var(ENV_TIMEOUT_MS, "2500");

        let config = RetryConfig::from_yaml_str(SAMPLE)
            .unwrap()
            .apply_env_overrides()
            .unwrap();
        clear_env();

        assert_eq!(config.default.max_attempts, Some(MaxAttempts::Unlimited));
        assert_eq!(config.default.delay, Some(Duration::from_millis(15)));
        assert_eq!(config.default.timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_value() {
        clear_env();
        env::set_var(ENV_DELAY_MS, "five seconds");

        let result = RetryConfig::default().apply_env_overrides();
        clear_env();

        match result {
            Err(Error::InvalidEnv { var, value }) => {
                assert_eq!(var, ENV_DELAY_MS);
                assert_eq!(value, "five seconds");
            }
            other => panic!("Expected InvalidEnv, got {:?}", other),
        }
    }
}
