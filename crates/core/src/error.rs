//! Core error types for convergence runs.
//!
//! All errors are explicit, typed, and cloneable so a single failure can be
//! recorded on its task and reported again in the aggregate run result.

use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::Lifecycle;

/// The standard Result type for converge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for converge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Task validation
    #[error("field '{field}' is required")]
    RequiredField { field: String },

    #[error("field '{field}' cannot be changed")]
    CannotChangeField { field: String },

    #[error("lifecycle {lifecycle} violated: {reason}")]
    LifecycleViolation { lifecycle: Lifecycle, reason: String },

    // Graph
    #[error("dependency graph malformed: cycle involving {tasks:?}")]
    GraphCycle { tasks: Vec<String> },

    #[error("task '{task}' references unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    // Provider
    #[error("transient provider error: {reason}")]
    Transient { reason: String },

    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("provider error: {reason}")]
    ProviderFatal { reason: String },

    #[error("no provider adapter registered for kind '{kind}'")]
    MissingAdapter { kind: String },

    // Run
    #[error("dependency '{dependency}' failed")]
    DependencyFailed { dependency: String },

    #[error("not started: run aborted after '{cause}' failed")]
    RunAborted { cause: String },

    #[error("convergence failed for {} task(s): {}", .failed.len(), .failed.join(", "))]
    ConvergenceFailed { failed: Vec<String> },

    // Configuration and files
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to parse configuration: {reason}")]
    ConfigParseFailed { reason: String },

    #[error("failed to parse manifest: {reason}")]
    ManifestParseFailed { reason: String },

    #[error("snapshot error: {reason}")]
    SnapshotFailed { reason: String },

    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to write file '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },
}

impl Error {
    /// Create a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Create an immutable field error.
    pub fn cannot_change_field(field: impl Into<String>) -> Self {
        Self::CannotChangeField {
            field: field.into(),
        }
    }

    /// Create a lifecycle violation error.
    pub fn lifecycle_violation(lifecycle: Lifecycle, reason: impl Into<String>) -> Self {
        Self::LifecycleViolation {
            lifecycle,
            reason: reason.into(),
        }
    }

    /// Create a graph cycle error.
    #[must_use]
    pub fn graph_cycle(tasks: Vec<String>) -> Self {
        Self::GraphCycle { tasks }
    }

    /// Create an unknown dependency error.
    pub fn unknown_dependency(task: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            task: task.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a transient (retryable) provider error.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Create a retry exhausted error.
    pub fn retry_exhausted(
        operation: impl Into<String>,
        attempts: u32,
        last_error: impl Into<String>,
    ) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create a fatal provider error.
    pub fn provider_fatal(reason: impl Into<String>) -> Self {
        Self::ProviderFatal {
            reason: reason.into(),
        }
    }

    /// Create a missing adapter error.
    pub fn missing_adapter(kind: impl Into<String>) -> Self {
        Self::MissingAdapter { kind: kind.into() }
    }

    /// Create a dependency failed error.
    pub fn dependency_failed(dependency: impl Into<String>) -> Self {
        Self::DependencyFailed {
            dependency: dependency.into(),
        }
    }

    /// Create a run aborted error.
    pub fn run_aborted(cause: impl Into<String>) -> Self {
        Self::RunAborted {
            cause: cause.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the Retry Executor should try the operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error was caused by another task rather than the task it is recorded on.
    #[must_use]
    pub const fn is_secondary(&self) -> bool {
        matches!(
            self,
            Self::DependencyFailed { .. } | Self::RunAborted { .. }
        )
    }
}
