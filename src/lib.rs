//! # a3s-command
//!
//! Update acquisition and command dispatch for chat bots in the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-command` obtains bot updates either pushed by a webhook or pulled
//! by long polling, finds the commands each update carries, runs their
//! handlers and, in pull mode, acknowledges the batch by advancing the
//! source cursor past the highest update id.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_command::{CommandDispatcher, CommandRegistry, DispatchLoop, Update};
//! use a3s_command::source::memory::MemorySource;
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_command::Result<()> {
//! let mut registry = CommandRegistry::new();
//! registry.register_fn("start", |invocation| async move {
//!     Ok(serde_json::json!({ "chat": invocation.chat_id(), "reply": "welcome" }))
//! })?;
//!
//! let source = Arc::new(MemorySource::new());
//! source.push(Update::with_text(10, 42, "/start")).await;
//!
//! let dispatch_loop = DispatchLoop::new(source, CommandDispatcher::new(registry));
//! let report = dispatch_loop.process_updates().await?;
//!
//! println!("Dispatched {} updates, ack: {:?}", report.records.len(), report.ack);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sources
//!
//! - **memory**: in-memory queue for testing and single-process use
//! - **telegram**: Telegram Bot API `getUpdates` long polling and webhook bodies
//!
//! ## Architecture
//!
//! - **UpdateSource** trait: transport abstraction, pull and push
//! - **CommandRegistry** / **CommandDispatcher**: name lookup and handler execution
//! - **DispatchLoop**: one acquire, dispatch, acknowledge cycle per call
//! - **PollingRunner**: repeated pull cycles with backoff and shutdown

pub mod ack;
pub mod command;
pub mod config;
pub mod cursor;
pub mod dispatch_loop;
pub mod dispatcher;
pub mod error;
pub mod failure;
pub mod resolver;
pub mod runner;
pub mod source;
pub mod types;

// Re-export core types
pub use ack::AcknowledgmentTracker;
pub use command::{Command, CommandRegistry, FnCommand, HandlerResult, Invocation};
pub use config::{DispatchConfig, RunnerConfig};
pub use cursor::{CursorRecord, CursorStore, FileCursorStore, MemoryCursorStore};
pub use dispatch_loop::{DispatchLoop, LoopState};
pub use dispatcher::CommandDispatcher;
pub use error::{BoxError, CommandError, Result};
pub use failure::{FailedCommand, FailureHandler, MemoryFailureHandler};
pub use resolver::CommandEntityResolver;
pub use runner::{PollingRunner, RunSummary};
pub use source::UpdateSource;
pub use types::{
    AckStatus, Chat, CommandOutput, DispatchRecord, EntityKind, FetchMode, FetchParams,
    LoopOutcome, Message, MessageEntity, PollReport, Update, User,
};

// Re-export sources for convenience
pub use source::memory::MemorySource;
pub use source::telegram::{TelegramClient, TelegramConfig, TelegramSource};
