//! Core types for the a3s-command system
//!
//! The update model mirrors the Telegram Bot API and keeps its snake_case
//! field names so webhook bodies and `getUpdates` results deserialize as-is.
//! Everything produced by this crate uses camelCase JSON serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single inbound update
///
/// `update_id` is the sequence identifier: unique per source, non-decreasing
/// within a batch, and the position used to advance the delivery cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Sequence identifier
    pub update_id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_channel_post: Option<Message>,

    /// Update kinds without a dedicated field (callback queries, polls, ...)
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

impl Update {
    /// Create an update carrying a plain text message
    pub fn with_text(update_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self::with_message(update_id, Message::text(update_id, chat_id, text))
    }

    /// Create an update carrying the given message
    pub fn with_message(update_id: i64, message: Message) -> Self {
        Self {
            update_id,
            message: Some(message),
            edited_message: None,
            channel_post: None,
            edited_channel_post: None,
            other: HashMap::new(),
        }
    }

    /// The message this update is about, whichever field carries it
    pub fn message(&self) -> Option<&Message> {
        self.message
            .as_ref()
            .or(self.edited_message.as_ref())
            .or(self.channel_post.as_ref())
            .or(self.edited_channel_post.as_ref())
    }

    /// Chat id of the carried message, if any
    pub fn chat_id(&self) -> Option<i64> {
        self.message().map(|m| m.chat.id)
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,

    /// Unix timestamp in seconds
    #[serde(default)]
    pub date: i64,

    pub chat: Chat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caption_entities: Vec<MessageEntity>,
}

impl Message {
    /// Create a private-chat text message
    ///
    /// A leading `/command` token gets a matching `bot_command` entity,
    /// the way the Bot API would deliver it.
    pub fn text(message_id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        let entities = leading_command_span(&text)
            .map(|length| vec![MessageEntity::bot_command(0, length)])
            .unwrap_or_default();

        Self {
            message_id,
            date: Utc::now().timestamp(),
            chat: Chat::private(chat_id),
            from: None,
            text: Some(text),
            entities,
            caption: None,
            caption_entities: Vec::new(),
        }
    }

    /// Text and entities to scan: the message text, or the caption when
    /// the message has no text
    pub fn content(&self) -> Option<(&str, &[MessageEntity])> {
        match (&self.text, &self.caption) {
            (Some(text), _) => Some((text.as_str(), self.entities.as_slice())),
            (None, Some(caption)) => Some((caption.as_str(), self.caption_entities.as_slice())),
            (None, None) => None,
        }
    }

    /// Send time as a UTC timestamp
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// Length of a leading `/command` token in UTF-16 code units
fn leading_command_span(text: &str) -> Option<usize> {
    if !text.starts_with('/') {
        return None;
    }
    let token = text.split_whitespace().next()?;
    if token.len() < 2 {
        return None;
    }
    Some(token.encode_utf16().count())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,

    /// "private", "group", "supergroup" or "channel"
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Chat {
    pub fn private(id: i64) -> Self {
        Self {
            id,
            kind: "private".to_string(),
            title: None,
            username: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    #[serde(default)]
    pub is_bot: bool,

    #[serde(default)]
    pub first_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Kind of a message entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Eligible for command dispatch
    BotCommand,
    Mention,
    Hashtag,
    Cashtag,
    Url,
    Email,
    Bold,
    Italic,
    Code,
    Pre,
    TextLink,
    TextMention,
    #[serde(other)]
    Other,
}

/// A span of special text inside a message
///
/// `offset` and `length` count UTF-16 code units. An entity of kind
/// [`EntityKind::BotCommand`] locates a command invocation, including its
/// leading `/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl MessageEntity {
    /// Create a command entity
    pub fn bot_command(offset: usize, length: usize) -> Self {
        Self {
            kind: EntityKind::BotCommand,
            offset,
            length,
        }
    }

    pub fn is_command(&self) -> bool {
        self.kind == EntityKind::BotCommand
    }

    /// Text covered by this entity, or `None` when the span is out of range
    pub fn slice(&self, text: &str) -> Option<String> {
        utf16_slice(text, self.offset, self.end()?)
    }

    /// Trimmed text following this entity
    ///
    /// Empty when the entity ends past the text.
    pub fn trailing(&self, text: &str) -> String {
        let units: Vec<u16> = text.encode_utf16().collect();
        match self.end() {
            Some(end) if end <= units.len() => {
                String::from_utf16_lossy(&units[end..]).trim().to_string()
            }
            _ => String::new(),
        }
    }

    /// End of the span; `None` if `offset + length` overflows
    fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.length)
    }
}

fn utf16_slice(text: &str, start: usize, end: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    if start > end || end > units.len() {
        return None;
    }
    String::from_utf16(&units[start..end]).ok()
}

/// Long-poll request parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchParams {
    /// First update id to return; every update below it is confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    /// Maximum number of updates to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Server-side long-poll timeout in seconds (0 = short poll)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Update kinds to receive; empty keeps the source's default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_updates: Vec<String>,
}

impl FetchParams {
    /// Zero-effect confirmation request: start at `offset`, return at most one
    pub fn acknowledge(offset: i64) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(1),
            timeout_secs: 0,
            allowed_updates: Vec::new(),
        }
    }
}

/// How a batch is acquired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Exactly one externally supplied update (webhook)
    Push,
    /// Long-poll request
    Pull(FetchParams),
}

/// Outcome of one handler invocation within a batch dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum CommandOutput {
    /// Handler returned a value
    Completed {
        command: String,
        value: serde_json::Value,
    },
    /// Handler failed; the batch carried on
    Failed { command: String, reason: String },
}

impl CommandOutput {
    pub fn command(&self) -> &str {
        match self {
            Self::Completed { command, .. } | Self::Failed { command, .. } => command,
        }
    }

    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Dispatch outcome of one update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub update_id: i64,

    /// Handler outputs in entity order; empty when no command matched
    pub outputs: Vec<CommandOutput>,
}

impl DispatchRecord {
    /// Values returned by handlers that completed
    pub fn values(&self) -> Vec<&serde_json::Value> {
        self.outputs.iter().filter_map(CommandOutput::value).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandOutput> {
        self.outputs.iter().filter(|o| o.is_failed())
    }
}

/// Result of the acknowledgment step of a pull cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum AckStatus {
    /// Empty batch, nothing to acknowledge
    Skipped,
    /// Cursor advanced to `offset`
    Confirmed { offset: i64 },
    /// Confirmation request failed; records stand, redelivery possible
    Failed { offset: i64, reason: String },
}

impl AckStatus {
    /// Treat a failed acknowledgment as an error
    pub fn into_result(self) -> crate::error::Result<Option<i64>> {
        match self {
            Self::Skipped => Ok(None),
            Self::Confirmed { offset } => Ok(Some(offset)),
            Self::Failed { offset, reason } => {
                Err(crate::error::CommandError::Acknowledgment { offset, reason })
            }
        }
    }
}

/// Result of one pull cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollReport {
    /// Correlation id (cycle-<uuid>)
    pub cycle_id: String,

    /// One record per update, in batch order
    pub records: Vec<DispatchRecord>,

    pub ack: AckStatus,
}

/// Result of `commands_handler`
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// Outputs of the single pushed update
    Webhook(Vec<CommandOutput>),
    /// Records of a pulled batch
    Polled(PollReport),
}
