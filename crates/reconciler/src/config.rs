//! Configuration for convergence runs.
//!
//! ```toml
//! [runner]
//! max_concurrency = 8
//! failure_policy = "fail_fast"
//! dry_run = false
//!
//! [backoff.read]
//! initial_delay_ms = 1000
//! factor = 1.5
//! jitter = 0.1
//! max_attempts = 4
//!
//! [backoff.write]
//! max_attempts = 5
//! ```
//!
//! Every key is optional. Backoff keys left out keep the value of the
//! `read` or `write` preset.

use std::path::Path;
use std::time::Duration;

use converge_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::retry::BackoffPolicy;
use crate::runner::{DEFAULT_MAX_CONCURRENCY, FailurePolicy, RunnerConfig};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvergeConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub backoff: BackoffSection,
}

/// `[runner]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerSection {
    /// Maximum tasks reconciled concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            failure_policy: FailurePolicy::default(),
            dry_run: false,
        }
    }
}

const fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// `[backoff]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSection {
    #[serde(default)]
    pub read: BackoffSettings,
    #[serde(default)]
    pub write: BackoffSettings,
}

/// Overrides applied on top of a backoff preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl BackoffSettings {
    /// Apply these overrides to `preset`.
    #[must_use]
    pub fn apply_to(&self, preset: BackoffPolicy) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: self
                .initial_delay_ms
                .map_or(preset.initial_delay, Duration::from_millis),
            factor: self.factor.unwrap_or(preset.factor),
            jitter: self.jitter.unwrap_or(preset.jitter),
            max_attempts: self.max_attempts.unwrap_or(preset.max_attempts),
            max_delay: self
                .max_delay_ms
                .map_or(preset.max_delay, Duration::from_millis),
        }
    }
}

impl ConvergeConfig {
    /// Load and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed`, `ConfigParseFailed`, or `InvalidConfig`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParseFailed` or `InvalidConfig`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::ConfigParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Effective read backoff policy.
    #[must_use]
    pub fn read_backoff(&self) -> BackoffPolicy {
        self.backoff.read.apply_to(BackoffPolicy::read())
    }

    /// Effective write backoff policy.
    #[must_use]
    pub fn write_backoff(&self) -> BackoffPolicy {
        self.backoff.write.apply_to(BackoffPolicy::write())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero concurrency limit or a bad backoff policy.
    pub fn validate(&self) -> Result<()> {
        self.runner_config().validate()
    }

    /// Runner settings described by this file.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_concurrency: self.runner.max_concurrency,
            failure_policy: self.runner.failure_policy,
            dry_run: self.runner.dry_run,
            read_backoff: self.read_backoff(),
            write_backoff: self.write_backoff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ConvergeConfig::from_toml_str("").ok();
        assert_eq!(
            config.map(|c| c.runner_config()),
            Some(RunnerConfig::default())
        );
    }

    #[test]
    fn test_partial_backoff_keeps_preset_values() {
        let config = ConvergeConfig::from_toml_str(
            r#"
            [runner]
            failure_policy = "continue_independent"

            [backoff.write]
            max_attempts = 7
            "#,
        )
        .ok();
        let runner = config.map(|c| c.runner_config());

        assert_eq!(
            runner.as_ref().map(|r| r.failure_policy),
            Some(FailurePolicy::ContinueIndependent)
        );
        assert_eq!(
            runner.as_ref().map(|r| r.write_backoff),
            Some(BackoffPolicy::write().with_max_attempts(7))
        );
        assert_eq!(runner.map(|r| r.read_backoff), Some(BackoffPolicy::read()));
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let result = ConvergeConfig::from_toml_str("[runner]\nmax_concurrency = 0\n");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let result = ConvergeConfig::from_toml_str("[runner]\nparallelism = 3\n");
        assert!(matches!(result, Err(Error::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_bad_jitter_is_invalid() {
        let result = ConvergeConfig::from_toml_str("[backoff.read]\njitter = 1.5\n");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
