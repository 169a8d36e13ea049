//! Serializable configuration
//!
//! ```json
//! {
//!   "max_trials": 5,
//!   "backoff": { "kind": "exponential", "initial_delay_ms": 100, "max_delay_ms": 5000, "multiplier": 2.0 },
//!   "chunk_size": 50000,
//!   "exception_handling": "warn"
//! }
//! ```
//!
//! Every field is optional. `exception_handling` accepts any string; names
//! other than `raise` and `warn` only fail when a chunked read is interrupted.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::read::{PartialFailurePolicy, ReadOptions};
use crate::retry::{Backoff, RetryPolicy};

/// Retry and read settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Maximum number of trials per operation
    pub max_trials: u32,
    /// Delay between transient failures
    pub backoff: Backoff,
    /// Rows per batch for reads; unset reads in one go
    pub chunk_size: Option<usize>,
    /// Policy for reads interrupted part way
    pub exception_handling: PartialFailurePolicy,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_trials: 3,
            backoff: Backoff::None,
            chunk_size: None,
            exception_handling: PartialFailurePolicy::Raise,
        }
    }
}

impl SqlConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))
    }

    /// Check the values before use
    pub fn validate(&self) -> Result<()> {
        self.read_options().validate()
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_trials: self.max_trials,
            backoff: self.backoff.clone(),
        }
    }

    /// Read options described by this configuration
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            retry: self.retry_policy(),
            batch_size: self.chunk_size,
            failure_policy: self.exception_handling.clone(),
        }
    }
}
