//! In-memory update source for tests and single-process use
//!
//! Follows the long-poll cursor contract: updates stay pending until a
//! fetch with a higher offset confirms them.

use super::UpdateSource;
use crate::error::{CommandError, Result};
use crate::types::{FetchParams, Update};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

const DEFAULT_LIMIT: usize = 100;

#[derive(Default)]
struct MemoryState {
    /// Unconfirmed updates, sorted by id
    pending: Vec<Update>,
    /// Lowest id that may still be delivered
    confirmed_offset: Option<i64>,
    webhook: Option<Update>,
    requests: Vec<FetchParams>,
    acknowledgments: Vec<i64>,
    fail_next: Option<String>,
}

/// In-memory update source
#[derive(Default)]
pub struct MemorySource {
    state: RwLock<MemoryState>,
    arrivals: Notify,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source with updates already queued
    pub async fn with_updates(updates: impl IntoIterator<Item = Update>) -> Self {
        let source = Self::new();
        for update in updates {
            source.push(update).await;
        }
        source
    }

    /// Queue an update for pulling
    ///
    /// Updates below the confirmed offset are dropped, as the real
    /// transport would never deliver them again.
    pub async fn push(&self, update: Update) {
        {
            let mut state = self.state.write().await;
            if state
                .confirmed_offset
                .is_some_and(|offset| update.update_id < offset)
            {
                tracing::debug!(
                    update_id = update.update_id,
                    "Dropping update below confirmed offset"
                );
                return;
            }
            let at = state
                .pending
                .partition_point(|u| u.update_id <= update.update_id);
            state.pending.insert(at, update);
        }
        self.arrivals.notify_waiters();
    }

    /// Set the update returned by the next webhook acquisition
    pub async fn push_webhook(&self, update: Update) {
        self.state.write().await.webhook = Some(update);
    }

    /// Make the next fetch fail with an acquisition error
    pub async fn fail_next_fetch(&self, reason: impl Into<String>) {
        self.state.write().await.fail_next = Some(reason.into());
    }

    /// Updates not yet confirmed
    pub async fn pending(&self) -> Vec<Update> {
        self.state.read().await.pending.clone()
    }

    pub async fn confirmed_offset(&self) -> Option<i64> {
        self.state.read().await.confirmed_offset
    }

    /// Offsets passed to `advance_cursor`, in call order
    pub async fn acknowledgments(&self) -> Vec<i64> {
        self.state.read().await.acknowledgments.clone()
    }

    /// Every fetch request received, acknowledgments included
    pub async fn requests(&self) -> Vec<FetchParams> {
        self.state.read().await.requests.clone()
    }

    /// Confirm, then return what is deliverable; `None` if nothing is
    async fn take_deliverable(&self, params: &FetchParams) -> Result<Option<Vec<Update>>> {
        let mut state = self.state.write().await;

        if let Some(reason) = state.fail_next.take() {
            return Err(CommandError::Acquisition(reason));
        }

        if let Some(offset) = params.offset {
            let current = state.confirmed_offset.unwrap_or(i64::MIN);
            if offset > current {
                state.confirmed_offset = Some(offset);
                state.pending.retain(|u| u.update_id >= offset);
            }
        }

        if state.pending.is_empty() {
            return Ok(None);
        }

        let limit = params.limit.map(|l| l as usize).unwrap_or(DEFAULT_LIMIT);
        Ok(Some(state.pending.iter().take(limit).cloned().collect()))
    }
}

#[async_trait]
impl UpdateSource for MemorySource {
    async fn fetch_updates(&self, params: &FetchParams) -> Result<Vec<Update>> {
        self.state.write().await.requests.push(params.clone());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(params.timeout_secs);
        loop {
            let arrival = self.arrivals.notified();
            if let Some(batch) = self.take_deliverable(params).await? {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn webhook_update(&self) -> Result<Update> {
        self.state
            .write()
            .await
            .webhook
            .take()
            .ok_or_else(|| CommandError::Acquisition("No webhook update pending".to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn advance_cursor(&self, offset: i64) -> Result<Vec<Update>> {
        self.state.write().await.acknowledgments.push(offset);
        self.fetch_updates(&FetchParams::acknowledge(offset)).await
    }
}
