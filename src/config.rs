//! Dispatch loop and runner configuration

use crate::error::{CommandError, Result};
use crate::types::FetchParams;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dispatch loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchConfig {
    /// Server-side long-poll timeout in seconds
    pub poll_timeout_secs: u64,

    /// Maximum updates per pull (1-100)
    pub poll_limit: u32,

    /// Update kinds to request; empty keeps the source's default
    pub allowed_updates: Vec<String>,

    /// Extra time beyond `poll_timeout_secs` before a pull is abandoned
    pub acquire_grace_secs: u64,

    /// Updates of one batch dispatched concurrently (1 = sequential)
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            poll_limit: 100,
            allowed_updates: Vec::new(),
            acquire_grace_secs: 10,
            max_concurrency: 1,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.poll_limit) {
            return Err(CommandError::Config(format!(
                "pollLimit must be between 1 and 100, got {}",
                self.poll_limit
            )));
        }
        if self.max_concurrency == 0 {
            return Err(CommandError::Config(
                "maxConcurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters for a regular pull; the source supplies its own cursor
    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            offset: None,
            limit: Some(self.poll_limit),
            timeout_secs: self.poll_timeout_secs,
            allowed_updates: self.allowed_updates.clone(),
        }
    }

    /// How long a pull may take before it is abandoned
    pub fn acquire_deadline(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs + self.acquire_grace_secs)
    }
}

/// Continuous polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Pause after a failed cycle before polling again
    pub error_backoff_secs: u64,

    /// Pause between cycles that returned no updates
    pub idle_delay_ms: u64,

    /// Stop after this many cycles (unbounded when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            error_backoff_secs: 5,
            idle_delay_ms: 0,
            max_cycles: None,
        }
    }
}
