//! Acquisition → dispatch → acknowledgment cycle
//!
//! `DispatchLoop` ties an [`UpdateSource`], a [`CommandDispatcher`] and the
//! [`AcknowledgmentTracker`] together. Each invocation runs one cycle:
//!
//! ```text
//! Idle → Acquiring → Dispatching → Acknowledging → Idle
//! ```
//!
//! Webhook cycles skip `Acknowledging`; a pushed update has no cursor.

use crate::ack::AcknowledgmentTracker;
use crate::command::Command;
use crate::config::DispatchConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{CommandError, Result};
use crate::failure::{FailedCommand, FailureHandler};
use crate::source::UpdateSource;
use crate::types::{
    AckStatus, CommandOutput, DispatchRecord, FetchMode, LoopOutcome, MessageEntity, PollReport,
    Update,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Phase of the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Acquiring,
    Dispatching,
    Acknowledging,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Acquiring,
            2 => Self::Dispatching,
            3 => Self::Acknowledging,
            _ => Self::Idle,
        }
    }
}

/// Resets the loop to `Idle` however the cycle ends
struct IdleOnDrop<'a>(&'a AtomicU8);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(LoopState::Idle as u8, Ordering::SeqCst);
    }
}

/// Update acquisition and command dispatch loop
///
/// Holds no state across cycles except what the source persists.
/// Overlapping invocations on one loop are serialized.
pub struct DispatchLoop {
    source: Arc<dyn UpdateSource>,
    dispatcher: Arc<CommandDispatcher>,
    config: DispatchConfig,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    state: AtomicU8,
    cycle: Mutex<()>,
}

impl DispatchLoop {
    /// Create a loop with the default configuration
    pub fn new(
        source: Arc<dyn UpdateSource>,
        dispatcher: impl Into<Arc<CommandDispatcher>>,
    ) -> Self {
        Self {
            source,
            dispatcher: dispatcher.into(),
            config: DispatchConfig::default(),
            failure_handler: None,
            state: AtomicU8::new(LoopState::Idle as u8),
            cycle: Mutex::new(()),
        }
    }

    /// Replace the configuration after validating it
    pub fn with_config(mut self, config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Forward failed handler executions to `handler`
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn UpdateSource {
        self.source.as_ref()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// All registered commands
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        self.dispatcher.registry().commands()
    }

    /// Run one cycle in webhook (push) or polling (pull) mode
    pub async fn commands_handler(&self, webhook: bool) -> Result<LoopOutcome> {
        if webhook {
            Ok(LoopOutcome::Webhook(self.process_webhook().await?))
        } else {
            Ok(LoopOutcome::Polled(self.process_updates().await?))
        }
    }

    /// Dispatch the pushed update and return its outputs
    pub async fn process_webhook(&self) -> Result<Vec<CommandOutput>> {
        let _cycle = self.cycle.lock().await;
        let _idle = IdleOnDrop(&self.state);

        self.set_state(LoopState::Acquiring);
        let batch = self.source.fetch_batch(FetchMode::Push).await?;

        self.set_state(LoopState::Dispatching);
        let mut outputs = Vec::new();
        for update in &batch {
            let record = self.dispatch_record(update).await;
            self.report_failures(&record).await;
            outputs.extend(record.outputs);
        }

        tracing::debug!(
            source = self.source.name(),
            outputs = outputs.len(),
            "Webhook update processed"
        );
        Ok(outputs)
    }

    /// Pull a batch, dispatch every update, then acknowledge the batch
    ///
    /// Acquisition errors and timeouts propagate; nothing is acknowledged.
    /// Handler failures stay inside their update's record. An
    /// acknowledgment failure is reported in [`PollReport::ack`] and the
    /// records are still returned.
    pub async fn process_updates(&self) -> Result<PollReport> {
        let _cycle = self.cycle.lock().await;
        let _idle = IdleOnDrop(&self.state);
        let cycle_id = format!("cycle-{}", uuid::Uuid::new_v4());

        self.set_state(LoopState::Acquiring);
        let batch = self.acquire(&cycle_id).await?;

        self.set_state(LoopState::Dispatching);
        let pending: Vec<_> = batch
            .iter()
            .map(|update| self.dispatch_record(update))
            .collect();
        let records: Vec<DispatchRecord> = futures::stream::iter(pending)
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        let mut tracker = AcknowledgmentTracker::new();
        for record in &records {
            tracker.observe(record.update_id);
            self.report_failures(record).await;
        }

        let ack = if tracker.highest().is_some() {
            self.set_state(LoopState::Acknowledging);
            tracker.acknowledge(self.source.as_ref()).await
        } else {
            AckStatus::Skipped
        };

        tracing::debug!(
            cycle_id = %cycle_id,
            source = self.source.name(),
            updates = records.len(),
            ack = ?ack,
            "Cycle complete"
        );

        Ok(PollReport {
            cycle_id,
            records,
            ack,
        })
    }

    /// Dispatch a single update
    pub async fn process_update(&self, update: &Update) -> Vec<CommandOutput> {
        self.dispatcher.dispatch(update).await
    }

    /// Invoke a command by name, synthesizing its entity if not given
    pub async fn trigger_command(
        &self,
        name: &str,
        update: &Update,
        entity: Option<MessageEntity>,
    ) -> Result<serde_json::Value> {
        self.dispatcher.trigger(name, update, entity).await
    }

    async fn acquire(&self, cycle_id: &str) -> Result<Vec<Update>> {
        let deadline = self.config.acquire_deadline();
        let mode = FetchMode::Pull(self.config.fetch_params());

        let batch = tokio::time::timeout(deadline, self.source.fetch_batch(mode))
            .await
            .map_err(|_| {
                CommandError::Timeout(format!(
                    "Pulling updates from '{}' exceeded {}s",
                    self.source.name(),
                    deadline.as_secs()
                ))
            })??;

        tracing::debug!(
            cycle_id,
            source = self.source.name(),
            updates = batch.len(),
            "Batch acquired"
        );
        Ok(batch)
    }

    async fn dispatch_record(&self, update: &Update) -> DispatchRecord {
        DispatchRecord {
            update_id: update.update_id,
            outputs: self.dispatcher.dispatch(update).await,
        }
    }

    async fn report_failures(&self, record: &DispatchRecord) {
        let Some(handler) = &self.failure_handler else {
            return;
        };

        for output in record.failures() {
            if let CommandOutput::Failed { command, reason } = output {
                let failure = FailedCommand::new(record.update_id, command, reason);
                if let Err(e) = handler.handle(failure).await {
                    tracing::warn!(
                        update_id = record.update_id,
                        command = %command,
                        error = %e,
                        "Failure handler rejected command failure"
                    );
                }
            }
        }
    }
}
