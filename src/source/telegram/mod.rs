//! Telegram Bot API update source
//!
//! Implements `UpdateSource` over `getUpdates` long polling. Webhook
//! bodies received by the host's HTTP server are handed in through
//! [`TelegramSource::accept_webhook`].

mod client;
mod config;

pub use client::{get_updates_body, TelegramClient};
pub use config::{TelegramConfig, DEFAULT_API_BASE};

use crate::cursor::CursorStore;
use crate::error::{CommandError, Result};
use crate::source::UpdateSource;
use crate::types::{FetchParams, Update, User};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Telegram update source
///
/// Remembers the last acknowledged offset and sends it with pulls that
/// carry no explicit offset. With a [`CursorStore`] attached the offset
/// also survives restarts.
pub struct TelegramSource {
    client: TelegramClient,
    offset: RwLock<Option<i64>>,
    webhook: RwLock<Option<Update>>,
    cursor_store: Option<Arc<dyn CursorStore>>,
}

impl TelegramSource {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        Ok(Self {
            client: TelegramClient::new(config)?,
            offset: RwLock::new(None),
            webhook: RwLock::new(None),
            cursor_store: None,
        })
    }

    /// Attach a cursor store and resume from its saved offset
    pub fn with_cursor_store(mut self, store: Arc<dyn CursorStore>) -> Result<Self> {
        let saved = store.load()?;
        if let Some(offset) = saved {
            tracing::info!(offset, "Resuming Telegram updates from saved cursor");
        }
        self.offset = RwLock::new(saved);
        self.cursor_store = Some(store);
        Ok(self)
    }

    pub fn client(&self) -> &TelegramClient {
        &self.client
    }

    /// Offset sent with the next pull
    pub async fn offset(&self) -> Option<i64> {
        *self.offset.read().await
    }

    /// Verify the token and return the bot's own user
    pub async fn get_me(&self) -> Result<User> {
        let me = self.client.get_me().await?;
        tracing::info!(bot = ?me.username, "Telegram bot authenticated");
        Ok(me)
    }

    /// Parse a webhook request body and hold it for the next push cycle
    ///
    /// Returns the update id.
    pub async fn accept_webhook(&self, body: &[u8]) -> Result<i64> {
        let update: Update = serde_json::from_slice(body)?;
        let update_id = update.update_id;

        let replaced = self.webhook.write().await.replace(update);
        if let Some(previous) = replaced {
            tracing::warn!(
                update_id = previous.update_id,
                "Unprocessed webhook update replaced"
            );
        }
        Ok(update_id)
    }

    async fn remember_offset(&self, offset: i64) {
        {
            let mut current = self.offset.write().await;
            if current.is_some_and(|c| c >= offset) {
                return;
            }
            *current = Some(offset);
        }

        if let Some(store) = &self.cursor_store {
            if let Err(e) = store.save(offset) {
                tracing::warn!(offset, error = %e, "Failed to persist Telegram cursor");
            }
        }
    }
}

#[async_trait]
impl UpdateSource for TelegramSource {
    async fn fetch_updates(&self, params: &FetchParams) -> Result<Vec<Update>> {
        let mut params = params.clone();
        if params.offset.is_none() {
            params.offset = self.offset().await;
        }
        self.client.get_updates(&params).await
    }

    async fn webhook_update(&self) -> Result<Update> {
        self.webhook.write().await.take().ok_or_else(|| {
            CommandError::Acquisition("No Telegram webhook update received".to_string())
        })
    }

    fn name(&self) -> &str {
        "telegram"
    }

    async fn advance_cursor(&self, offset: i64) -> Result<Vec<Update>> {
        let housekeeping = self
            .client
            .get_updates(&FetchParams::acknowledge(offset))
            .await?;
        self.remember_offset(offset).await;
        Ok(housekeeping)
    }
}
