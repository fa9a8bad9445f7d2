//! Update source trait, the abstraction over update transports
//!
//! All transports (Telegram long polling, webhooks, in-memory queues)
//! implement `UpdateSource` so the dispatch loop can acquire and
//! acknowledge batches without knowing where they come from.

use crate::error::Result;
use crate::types::{FetchMode, FetchParams, Update};
use async_trait::async_trait;

pub mod memory;
pub mod telegram;

/// Core trait for update transports
///
/// Pull sources follow the long-poll cursor contract: a fetch with
/// `offset = N` confirms every update below `N`, and confirmed updates are
/// never delivered again. Where the confirmed offset is persisted is up to
/// the implementation.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Pull updates, blocking up to `params.timeout_secs` on the server side
    ///
    /// Returns zero or more updates ordered by `update_id`.
    async fn fetch_updates(&self, params: &FetchParams) -> Result<Vec<Update>>;

    /// Take the externally supplied (webhook) update
    async fn webhook_update(&self) -> Result<Update>;

    /// Source name (e.g., "telegram", "memory")
    fn name(&self) -> &str;

    /// Acquire a batch in the given mode
    ///
    /// Push mode yields exactly one update.
    async fn fetch_batch(&self, mode: FetchMode) -> Result<Vec<Update>> {
        match mode {
            FetchMode::Push => Ok(vec![self.webhook_update().await?]),
            FetchMode::Pull(params) => self.fetch_updates(&params).await,
        }
    }

    /// Confirm every update below `offset`
    ///
    /// Default implementation issues a zero-timeout fetch starting at
    /// `offset` capped at one result. The returned batch is housekeeping
    /// only and must not be dispatched.
    async fn advance_cursor(&self, offset: i64) -> Result<Vec<Update>> {
        self.fetch_updates(&FetchParams::acknowledge(offset)).await
    }
}
