//! Routing of a single update to its command handlers

use crate::command::{Command, CommandRegistry, Invocation};
use crate::error::{CommandError, Result};
use crate::resolver::CommandEntityResolver;
use crate::types::{CommandOutput, MessageEntity, Update};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Routes updates to the handlers registered in a [`CommandRegistry`]
///
/// Beyond routing the dispatcher has no side effects of its own; handlers
/// may have arbitrary ones.
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
    resolver: CommandEntityResolver,
}

impl CommandDispatcher {
    pub fn new(registry: impl Into<Arc<CommandRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            resolver: CommandEntityResolver::new(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run every registered command found in `update`
    ///
    /// Outputs follow entity order. No matching command yields an empty
    /// vector. A failing handler produces [`CommandOutput::Failed`] and the
    /// remaining commands still run.
    pub async fn dispatch(&self, update: &Update) -> Vec<CommandOutput> {
        let mut outputs = Vec::new();

        for (name, entity) in self.registry.parse_commands(update) {
            let Some(command) = self.registry.get(&name) else {
                tracing::debug!(
                    update_id = update.update_id,
                    command = %name,
                    "No handler registered for command"
                );
                continue;
            };

            match self.execute(command.as_ref(), &name, update, entity).await {
                Ok(value) => outputs.push(CommandOutput::Completed {
                    command: name,
                    value,
                }),
                Err(e) => {
                    tracing::warn!(
                        update_id = update.update_id,
                        command = %name,
                        error = %e,
                        "Command handler failed"
                    );
                    outputs.push(CommandOutput::Failed {
                        command: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outputs
    }

    /// Invoke `name` directly, skipping payload scanning
    ///
    /// Without an explicit entity a default one is synthesized. Fails with
    /// [`CommandError::UnknownCommand`] before running anything when the
    /// name is not registered.
    pub async fn trigger(
        &self,
        name: &str,
        update: &Update,
        entity: Option<MessageEntity>,
    ) -> Result<serde_json::Value> {
        let command = self
            .registry
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;

        let entity = self.resolver.resolve(name, entity);
        self.execute(command.as_ref(), name, update, entity).await
    }

    /// Run one handler, turning errors and panics into `HandlerExecution`
    async fn execute(
        &self,
        command: &dyn Command,
        name: &str,
        update: &Update,
        entity: MessageEntity,
    ) -> Result<serde_json::Value> {
        tracing::debug!(
            update_id = update.update_id,
            command = %name,
            offset = entity.offset,
            "Executing command"
        );

        let invocation = Invocation::new(name, update.clone(), entity);
        match AssertUnwindSafe(command.handle(invocation))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CommandError::handler(name, source)),
            Err(panic) => Err(CommandError::handler(name, panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("handler panicked: {}", detail)
}
