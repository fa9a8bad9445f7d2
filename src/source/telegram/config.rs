//! Telegram source configuration

use crate::error::{CommandError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token, or the name of an environment variable holding it
    pub bot_token: String,

    /// API root, overridable for self-hosted Bot API servers
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// HTTP time allowed on top of the long-poll timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: "TELEGRAM_BOT_TOKEN".to_string(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            ..Default::default()
        }
    }

    /// Resolve the bot token
    ///
    /// `bot_token` is looked up as an environment variable (as given, then
    /// upper-cased); if neither is set the value itself is the token.
    pub fn resolve_token(&self) -> Result<String> {
        let reference = self.bot_token.trim();
        if reference.is_empty() {
            return Err(CommandError::Config("Telegram bot token is empty".to_string()));
        }
        if let Ok(value) =
            std::env::var(reference).or_else(|_| std::env::var(reference.to_uppercase()))
        {
            if !value.is_empty() {
                return Ok(value);
            }
        }
        Ok(reference.to_string())
    }

    /// URL of a Bot API method
    pub fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), token, method)
    }
}
