//! Retry logic with jittered exponential backoff.
//!
//! Provider calls are wrapped in [`retry`]: transient failures are retried up
//! to a fixed number of attempts, anything else ends the operation at once.
//! Each delay grows from the previous *actual* delay, so jitter compounds.

use std::future::Future;
use std::time::Duration;

use converge_core::{Error, Result};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on any single delay unless configured otherwise.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff schedule for one class of provider calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Base for the first delay.
    pub initial_delay: Duration,
    /// Growth applied to the previous delay.
    pub factor: f64,
    /// Random perturbation, as a fraction of the delay (`0.1` is +/-10%).
    pub jitter: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Cap on a single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::read()
    }
}

impl BackoffPolicy {
    /// Policy for lookups: 1s, x1.5, 10% jitter, 4 attempts.
    #[must_use]
    pub const fn read() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            factor: 1.5,
            jitter: 0.1,
            max_attempts: 4,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Policy for mutations: like [`BackoffPolicy::read`] with 5 attempts.
    #[must_use]
    pub const fn write() -> Self {
        Self {
            max_attempts: 5,
            ..Self::read()
        }
    }

    /// Retry without waiting. Used by tests and dry runs against fakes.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
            max_attempts,
            max_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub const fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be at least 1"));
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(Error::invalid_config(format!(
                "factor must be a finite number >= 1, got {}",
                self.factor
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(Error::invalid_config(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::invalid_config(
                "initial_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }

    /// Delay before the second attempt. `sample` is in `[-1, 1]`.
    #[must_use]
    pub fn first_delay(&self, sample: f64) -> Duration {
        self.perturb(self.initial_delay.as_secs_f64(), sample)
    }

    /// Delay following `previous`. `sample` is in `[-1, 1]`.
    #[must_use]
    pub fn next_delay(&self, previous: Duration, sample: f64) -> Duration {
        self.perturb(previous.as_secs_f64() * self.factor, sample)
    }

    fn perturb(&self, base_secs: f64, sample: f64) -> Duration {
        let secs = base_secs * self.jitter.mul_add(sample.clamp(-1.0, 1.0), 1.0);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Uniform sample in `[-1, 1]`.
fn jitter_sample() -> f64 {
    rand::random::<f64>().mul_add(2.0, -1.0)
}

/// Result of one attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Transient failure, try again.
    Retry(Error),
    /// Permanent failure, stop now.
    Fatal(Error),
}

impl<T> From<Result<T>> for Attempt<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(error) if error.is_retryable() => Self::Retry(error),
            Err(error) => Self::Fatal(error),
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Every delay slept, in order.
    pub delays: Vec<Duration>,
    /// Total time spent, including delays.
    pub total_duration: Duration,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Convert to the operation's result.
    ///
    /// # Errors
    ///
    /// Returns the fatal error, or `RetryExhausted` after the last transient failure.
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Run `operation` under `policy`, recording attempts and delays.
pub async fn with_retry<T, F, Fut>(
    policy: &BackoffPolicy,
    operation: &str,
    mut attempt_fn: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let start = Instant::now();
    let budget = policy.max_attempts.max(1);
    let mut delays: Vec<Duration> = Vec::new();
    let mut last_error: Option<Error> = None;

    for attempt in 1..=budget {
        if attempt > 1 {
            let delay = delays.last().map_or_else(
                || policy.first_delay(jitter_sample()),
                |previous| policy.next_delay(*previous, jitter_sample()),
            );
            debug!(
                operation,
                attempt,
                delay_ms = ?delay.as_millis(),
                "Retrying after delay"
            );
            tokio::time::sleep(delay).await;
            delays.push(delay);
        }

        match attempt_fn().await {
            Attempt::Done(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Operation succeeded after retry");
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    delays,
                    total_duration: start.elapsed(),
                };
            }
            Attempt::Fatal(error) => {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                    delays,
                    total_duration: start.elapsed(),
                };
            }
            Attempt::Retry(error) => {
                warn!(
                    operation,
                    attempt,
                    error = %error,
                    remaining = budget.saturating_sub(attempt),
                    "Transient failure"
                );
                last_error = Some(error);
            }
        }
    }

    let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
    RetryOutcome {
        result: Err(Error::retry_exhausted(operation, budget, last_error)),
        attempts: budget,
        delays,
        total_duration: start.elapsed(),
    }
}

/// Run `operation` under `policy`, returning its result directly.
///
/// # Errors
///
/// Returns the first non-transient error, or `RetryExhausted` once every
/// attempt failed transiently.
pub async fn retry<T, F, Fut>(policy: &BackoffPolicy, operation: &str, attempt_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    with_retry(policy, operation, attempt_fn).await.into_result()
}
