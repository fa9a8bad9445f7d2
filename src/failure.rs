//! Failed command sink for handler failures that must not stop a batch
//!
//! Batch dispatch isolates each update: a failing handler is recorded in
//! its update's outputs and the loop moves on. A `FailureHandler` receives
//! those failures so they can be logged or stored.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A handler failure with the update it happened on
#[derive(Debug, Clone, PartialEq)]
pub struct FailedCommand {
    pub update_id: i64,

    /// Command name as invoked
    pub command: String,

    pub reason: String,

    /// Unix timestamp in milliseconds
    pub failed_at: u64,
}

impl FailedCommand {
    pub fn new(update_id: i64, command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            update_id,
            command: command.into(),
            reason: reason.into(),
            failed_at: now_millis(),
        }
    }
}

/// Trait for failed command sinks
#[async_trait]
pub trait FailureHandler: Send + Sync {
    /// Handle one failed command
    async fn handle(&self, failure: FailedCommand) -> Result<()>;

    /// Number of failures currently held
    async fn count(&self) -> Result<usize>;

    /// Most recent failures first
    async fn list(&self, limit: usize) -> Result<Vec<FailedCommand>>;
}

/// In-memory failure sink with bounded capacity
///
/// Oldest entries are dropped once `max_failures` is exceeded.
pub struct MemoryFailureHandler {
    failures: Arc<RwLock<Vec<FailedCommand>>>,
    max_failures: usize,
}

impl MemoryFailureHandler {
    pub fn new(max_failures: usize) -> Self {
        Self {
            failures: Arc::new(RwLock::new(Vec::new())),
            max_failures,
        }
    }
}

impl Default for MemoryFailureHandler {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl FailureHandler for MemoryFailureHandler {
    async fn handle(&self, failure: FailedCommand) -> Result<()> {
        tracing::warn!(
            update_id = failure.update_id,
            command = %failure.command,
            reason = %failure.reason,
            "Command failure recorded"
        );

        let mut failures = self.failures.write().await;
        failures.push(failure);

        if self.max_failures > 0 && failures.len() > self.max_failures {
            let drain_count = failures.len() - self.max_failures;
            failures.drain(..drain_count);
        }

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.failures.read().await.len())
    }

    async fn list(&self, limit: usize) -> Result<Vec<FailedCommand>> {
        let failures = self.failures.read().await;
        Ok(failures.iter().rev().take(limit).cloned().collect())
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
