//! Command handlers and the registry that binds names to them
//!
//! The registry is an ordinary value: build one, register commands, and
//! hand it to a [`CommandDispatcher`](crate::dispatcher::CommandDispatcher).
//! Independent registries never share state.

use crate::error::{BoxError, CommandError, Result};
use crate::types::{MessageEntity, Update};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Value produced by a handler, or the error it raised
pub type HandlerResult = std::result::Result<serde_json::Value, BoxError>;

/// Everything a handler knows about one invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Name the command was invoked under (may be an alias)
    pub name: String,

    /// The update that carried the invocation
    pub update: Update,

    /// Where the invocation sits in the message text
    pub entity: MessageEntity,

    /// Trimmed text following the command token
    pub arguments: String,
}

impl Invocation {
    pub fn new(name: impl Into<String>, update: Update, entity: MessageEntity) -> Self {
        let arguments = update
            .message()
            .and_then(|m| m.content())
            .map(|(text, _)| entity.trailing(text))
            .unwrap_or_default();

        Self {
            name: name.into(),
            update,
            entity,
            arguments,
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.update.chat_id()
    }
}

/// A registered command
#[async_trait]
pub trait Command: Send + Sync {
    /// Primary name, without the leading `/`
    fn name(&self) -> &str;

    /// Alternative names resolving to this command
    fn aliases(&self) -> &[String] {
        &[]
    }

    /// One-line help text
    fn description(&self) -> &str {
        ""
    }

    /// Run the command
    async fn handle(&self, invocation: Invocation) -> HandlerResult;
}

type HandlerFn = dyn Fn(Invocation) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Command backed by an async closure
pub struct FnCommand {
    name: String,
    aliases: Vec<String>,
    description: String,
    handler: Box<HandlerFn>,
}

impl FnCommand {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            handler: Box::new(move |invocation| Box::pin(handler(invocation))),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn handle(&self, invocation: Invocation) -> HandlerResult {
        (self.handler)(invocation).await
    }
}

/// Name → handler bindings plus command entity scanning
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,

    /// alias → primary name
    aliases: HashMap<String, String>,

    /// Bot username; `/cmd@other_bot` is ignored when set
    bot_username: Option<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept commands addressed to this bot (or to no bot)
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.bot_username = Some(username.trim_start_matches('@').to_string());
        self
    }

    /// Register a command under its name and aliases
    ///
    /// Fails without modifying the registry if any name is already taken.
    pub fn register(&mut self, command: impl Command + 'static) -> Result<()> {
        self.register_arc(Arc::new(command))
    }

    /// Register a shared command
    pub fn register_arc(&mut self, command: Arc<dyn Command>) -> Result<()> {
        let name = command.name().to_string();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(CommandError::Registration(format!(
                "Invalid command name '{}'",
                name
            )));
        }
        if self.is_taken(&name) {
            return Err(CommandError::Registration(format!(
                "Command name '{}' is already registered",
                name
            )));
        }
        for alias in command.aliases() {
            if alias == &name || self.is_taken(alias) {
                return Err(CommandError::Registration(format!(
                    "Alias '{}' of command '{}' conflicts with an existing command or alias",
                    alias, name
                )));
            }
        }

        for alias in command.aliases() {
            self.aliases.insert(alias.clone(), name.clone());
        }
        tracing::debug!(command = %name, aliases = ?command.aliases(), "Command registered");
        self.commands.insert(name, command);

        Ok(())
    }

    /// Register an async closure under `name`
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(FnCommand::new(name, handler))
    }

    fn is_taken(&self, name: &str) -> bool {
        self.commands.contains_key(name) || self.aliases.contains_key(name)
    }

    /// Look up a command by name, then by alias
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|n| self.commands.get(n)))
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All registered commands, sorted by name
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        let mut commands: Vec<_> = self.commands.values().cloned().collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Command invocations found in an update, in payload order
    ///
    /// Returns `(name, entity)` for every `bot_command` entity, with the
    /// leading `/` and any `@bot` suffix stripped. Names are not checked
    /// against the registry here.
    pub fn parse_commands(&self, update: &Update) -> Vec<(String, MessageEntity)> {
        let Some((text, entities)) = update.message().and_then(|m| m.content()) else {
            return Vec::new();
        };

        let mut found: Vec<(String, MessageEntity)> = entities
            .iter()
            .filter(|e| e.is_command())
            .filter_map(|entity| {
                let token = entity.slice(text)?;
                let name = self.command_name(&token)?;
                Some((name, *entity))
            })
            .collect();

        found.sort_by_key(|(_, entity)| entity.offset);
        found
    }

    /// `/name@bot` → `name`, or `None` if addressed to another bot
    fn command_name(&self, token: &str) -> Option<String> {
        let body = token.strip_prefix('/').unwrap_or(token);
        let (name, target) = match body.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (body, None),
        };

        if let (Some(target), Some(username)) = (target, &self.bot_username) {
            if !target.eq_ignore_ascii_case(username) {
                tracing::debug!(
                    command = name,
                    addressed_to = target,
                    "Command addressed to another bot"
                );
                return None;
            }
        }

        (!name.is_empty()).then(|| name.to_string())
    }
}
