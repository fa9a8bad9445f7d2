//! Telegram Bot API client for `getUpdates` and `getMe`

use super::config::TelegramConfig;
use crate::error::{CommandError, Result};
use crate::types::{FetchParams, Update, User};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

/// Low-level Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    config: Arc<TelegramConfig>,
}

impl TelegramClient {
    /// Create a client, resolving the bot token
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let token = config.resolve_token()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CommandError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Call `getUpdates`
    ///
    /// The HTTP timeout is the long-poll timeout plus the configured
    /// request allowance.
    pub async fn get_updates(&self, params: &FetchParams) -> Result<Vec<Update>> {
        let timeout =
            Duration::from_secs(params.timeout_secs + self.config.request_timeout_secs);
        let updates: Vec<Update> = self
            .call("getUpdates", &get_updates_body(params), timeout)
            .await?;

        tracing::debug!(
            offset = ?params.offset,
            limit = ?params.limit,
            updates = updates.len(),
            "getUpdates returned"
        );
        Ok(updates)
    }

    /// Call `getMe` to verify the token
    pub async fn get_me(&self) -> Result<User> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        self.call("getMe", &serde_json::json!({}), timeout).await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let url = self.config.method_url(&self.token, method);

        // without_url keeps the token out of error messages
        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                CommandError::Acquisition(format!(
                    "Telegram {} request failed: {}",
                    method,
                    e.without_url()
                ))
            })?;

        let status = resp.status();
        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
            CommandError::Acquisition(format!(
                "Failed to parse Telegram {} response ({}): {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                description,
                error_code,
                ..
            } => Err(CommandError::Acquisition(format!(
                "Telegram API error in {} ({}): {}",
                method,
                error_code.map_or_else(|| status.as_u16().to_string(), |c| c.to_string()),
                description.as_deref().unwrap_or("unknown error")
            ))),
        }
    }
}

/// JSON body of a `getUpdates` request
pub fn get_updates_body(params: &FetchParams) -> serde_json::Value {
    let mut body = serde_json::json!({ "timeout": params.timeout_secs });
    if let Some(offset) = params.offset {
        body["offset"] = offset.into();
    }
    if let Some(limit) = params.limit {
        body["limit"] = limit.into();
    }
    if !params.allowed_updates.is_empty() {
        body["allowed_updates"] = serde_json::json!(params.allowed_updates);
    }
    body
}
