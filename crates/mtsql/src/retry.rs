//! Bounded retry executor
//!
//! [`run_with_retry`] invokes an operation up to `max_trials` times. Each
//! failure is classified once: fatal and unknown errors propagate immediately,
//! transient ones are reported to the diagnostic sink and retried after the
//! configured backoff. When every trial failed transiently the call ends with
//! [`Error::ExhaustedRetries`], even when only one trial was allowed.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::classify::{classify, ClassifiedError};
use crate::diagnostics::DiagnosticSink;
use crate::error::{Error, Result};

/// Delay between transient failures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Retry immediately
    #[default]
    None,
    /// Same delay after every failed trial
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// Delay grows by `multiplier` after every failed trial
    Exponential {
        /// Delay after the first failed trial, in milliseconds
        initial_delay_ms: u64,
        /// Upper bound for any single delay, in milliseconds
        max_delay_ms: u64,
        /// Growth factor (2.0 doubles the delay)
        multiplier: f64,
    },
}

impl Backoff {
    /// Delay to wait after failed trial number `trial` (1-based)
    pub fn delay_after(&self, trial: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                if trial == 0 {
                    return Duration::ZERO;
                }
                // cap exponent to prevent overflow and degenerate backoff
                let exponent = trial.min(30) as i32 - 1;
                let delay = *initial_delay_ms as f64 * multiplier.powi(exponent);
                let capped = delay.min(*max_delay_ms as f64).max(0.0);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of trials, including the first one (at least 1)
    pub max_trials: u32,
    /// Delay between transient failures
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_trials: 3,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_trials` trials and no delay
    pub fn new(max_trials: u32) -> Self {
        Self {
            max_trials,
            ..Default::default()
        }
    }

    /// Single trial
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Fixed delay between trials
    pub fn fixed_delay(max_trials: u32, delay: Duration) -> Self {
        Self {
            max_trials,
            backoff: Backoff::Fixed {
                delay_ms: delay.as_millis() as u64,
            },
        }
    }

    /// Exponential backoff doubling from `initial` up to `max`
    pub fn exponential(max_trials: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_trials,
            backoff: Backoff::Exponential {
                initial_delay_ms: initial.as_millis() as u64,
                max_delay_ms: max.as_millis() as u64,
                multiplier: 2.0,
            },
        }
    }

    /// Set max trials (builder pattern)
    pub fn with_max_trials(mut self, max_trials: u32) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Set backoff (builder pattern)
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check the policy can run at least once
    pub fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            return Err(Error::config("max_trials must be at least 1"));
        }
        if let Backoff::Exponential { multiplier, .. } = self.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(Error::config(format!(
                    "backoff multiplier must be a finite number >= 1.0, got {multiplier}"
                )));
            }
        }
        Ok(())
    }
}

/// Execute an async operation with bounded retry
///
/// `operation` names the call in diagnostics and in
/// [`Error::ExhaustedRetries`].
///
/// # Example
///
/// ```rust,ignore
/// use mtsql::retry::{run_with_retry, RetryPolicy};
///
/// let rows = run_with_retry("app::load_users", &RetryPolicy::default(), None, || async {
///     conn.query("SELECT * FROM users", &[]).await
/// })
/// .await?;
/// ```
pub async fn run_with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    diagnostics: Option<&dyn DiagnosticSink>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy.validate()?;
    let max_trials = policy.max_trials;

    let mut trial = 0;
    loop {
        trial += 1;

        let error = match op().await {
            Ok(value) => {
                if trial > 1 {
                    debug!(operation, trial, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let error = match classify(error) {
            ClassifiedError::Transient(e) => e,
            other => {
                debug!(
                    operation,
                    trial,
                    disposition = %other.disposition(),
                    "not retrying"
                );
                return Err(other.into_error());
            }
        };

        if let Some(sink) = diagnostics {
            sink.transient_failure(trial, max_trials, operation, &error);
        }

        if trial >= max_trials {
            debug!(operation, trials = trial, "retries exhausted");
            return Err(Error::ExhaustedRetries {
                operation: operation.to_string(),
                trials: trial,
                last: Box::new(error),
            });
        }

        let delay = policy.backoff.delay_after(trial);
        debug!(operation, trial, delay_ms = delay.as_millis() as u64, error = %error, "retrying");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
