//! Continuous polling
//!
//! `DispatchLoop` never retries on its own. `PollingRunner` is the caller
//! side: it runs pull cycles back to back, backs off after failed
//! acquisitions and stops when the shutdown channel flips to `true`.

use crate::config::RunnerConfig;
use crate::dispatch_loop::DispatchLoop;
use crate::error::Result;
use crate::types::{AckStatus, PollReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Totals for one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Cycles attempted, failed ones included
    pub cycles: u64,
    /// Updates dispatched
    pub updates: u64,
    /// Handler executions that failed
    pub failures: u64,
    /// Cycles that ended with an error, plus failed acknowledgments
    pub errors: u64,
}

impl RunSummary {
    fn record(&mut self, report: &PollReport) {
        self.updates += report.records.len() as u64;
        self.failures += report
            .records
            .iter()
            .map(|r| r.failures().count() as u64)
            .sum::<u64>();
        if matches!(report.ack, AckStatus::Failed { .. }) {
            self.errors += 1;
        }
    }
}

/// Runs pull cycles until shutdown
pub struct PollingRunner {
    dispatch_loop: Arc<DispatchLoop>,
    config: RunnerConfig,
}

impl PollingRunner {
    pub fn new(dispatch_loop: Arc<DispatchLoop>) -> Self {
        Self {
            dispatch_loop,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatch_loop(&self) -> &DispatchLoop {
        &self.dispatch_loop
    }

    /// Poll until `shutdown` becomes `true` or `max_cycles` is reached
    ///
    /// A cycle in flight when shutdown is signalled is abandoned before
    /// its batch is acknowledged, so those updates are delivered again.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let source = self.dispatch_loop.source().name().to_string();
        tracing::info!(source = %source, "Polling started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self
                .config
                .max_cycles
                .is_some_and(|max| summary.cycles >= max)
            {
                break;
            }

            let result = tokio::select! {
                result = self.dispatch_loop.process_updates() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };
            summary.cycles += 1;

            let pause = match result {
                Ok(report) => {
                    summary.record(&report);
                    if report.records.is_empty() {
                        Duration::from_millis(self.config.idle_delay_ms)
                    } else {
                        Duration::ZERO
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(
                        source = %source,
                        error = %e,
                        "Poll cycle failed, retrying in {}s",
                        self.config.error_backoff_secs
                    );
                    Duration::from_secs(self.config.error_backoff_secs)
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown_requested(&mut shutdown) => break,
                }
            }
        }

        tracing::info!(
            source = %source,
            cycles = summary.cycles,
            updates = summary.updates,
            errors = summary.errors,
            "Polling stopped"
        );
        Ok(summary)
    }
}

/// Resolves once `true` is sent
///
/// A dropped sender never requested shutdown, so polling continues.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}
