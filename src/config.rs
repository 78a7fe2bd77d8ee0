//! Pipeline configuration.
//!
//! # Data Flow
//! ```text
//! TOML file (optional)
//!     → serde defaults fill missing keys
//!     → RESILIENCE__* environment overlay
//!     → validate() collects every problem
//!     → ResilienceConfig (immutable, shared read-only)
//! ```
//!
//! File layout:
//! ```toml
//! [retry]
//! max_attempts = 3
//! base_delay_seconds = 2
//!
//! [circuit_breaker]
//! failures_before_break = 2
//! break_seconds = 20
//!
//! [timeout]
//! seconds = 5
//! ```

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerError};
use crate::timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};
use crate::{Backoff, RetryPolicy, RetryPolicyBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Prefix of the environment overlay keys.
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },
    #[error("Validation failed: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

/// One semantic problem found during validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_seconds: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failures_before_break: usize,
    pub break_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { failures_before_break: 2, break_seconds: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub seconds: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { seconds: 5 }
    }
}

/// Thresholds loaded once at startup and shared read-only by every layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub timeout: TimeoutSettings,
}

impl ResilienceConfig {
    /// Parse TOML, apply the process environment overlay, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validated()
    }

    /// Defaults plus the process environment overlay, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validated()
    }

    /// Parse TOML without validating; missing keys take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `RESILIENCE__SECTION__KEY` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |section: &str, field: &str| -> Result<Option<u64>, ConfigError> {
            let key = format!("{ENV_PREFIX}__{section}__{field}");
            match lookup(&key) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| ConfigError::Env { key, value }),
            }
        };

        if let Some(v) = read("RETRY", "MAX_ATTEMPTS")? {
            self.retry.max_attempts = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = read("RETRY", "BASE_DELAY_SECONDS")? {
            self.retry.base_delay_seconds = v;
        }
        if let Some(v) = read("CIRCUIT_BREAKER", "FAILURES_BEFORE_BREAK")? {
            self.circuit_breaker.failures_before_break = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = read("CIRCUIT_BREAKER", "BREAK_SECONDS")? {
            self.circuit_breaker.break_seconds = v;
        }
        if let Some(v) = read("TIMEOUT", "SECONDS")? {
            self.timeout.seconds = v;
        }
        Ok(())
    }

    /// Returns every problem, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &'static str, message: &str| {
            if !ok {
                errors.push(ValidationError { field, message: message.to_string() });
            }
        };

        check(self.retry.max_attempts >= 1, "retry.max_attempts", "must be at least 1");
        check(
            self.circuit_breaker.failures_before_break >= 1,
            "circuit_breaker.failures_before_break",
            "must be at least 1",
        );
        check(self.circuit_breaker.break_seconds > 0, "circuit_breaker.break_seconds", "must be > 0");
        check(self.timeout.seconds > 0, "timeout.seconds", "must be > 0");
        check(
            self.timeout.seconds <= MAX_TIMEOUT.as_secs(),
            "timeout.seconds",
            "must not exceed one day",
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and log the effective configuration.
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate().map_err(ConfigError::Invalid)?;
        tracing::info!(
            retry_max_attempts = self.retry.max_attempts,
            retry_base_delay_s = self.retry.base_delay_seconds,
            breaker_failure_threshold = self.circuit_breaker.failures_before_break,
            breaker_open_duration_s = self.circuit_breaker.break_seconds,
            timeout_s = self.timeout.seconds,
            "resilience configuration loaded"
        );
        Ok(self)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry.base_delay_seconds)
    }

    pub fn breaker_open_duration(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker.break_seconds)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.seconds)
    }

    /// Retry builder preloaded with attempts and backoff; jitter and predicate stay default.
    pub fn retry_builder(&self) -> RetryPolicyBuilder {
        RetryPolicy::builder()
            .max_attempts(self.retry.max_attempts)
            .backoff(Backoff::exponential(self.retry_base_delay()))
    }

    pub fn circuit_breaker_config(&self) -> Result<CircuitBreakerConfig, CircuitBreakerError> {
        CircuitBreakerConfig::new(
            self.circuit_breaker.failures_before_break,
            self.breaker_open_duration(),
        )
    }

    pub fn timeout_policy(&self) -> Result<TimeoutPolicy, TimeoutError> {
        TimeoutPolicy::new(self.timeout_duration())
    }
}
