//! Default command entities for manually triggered commands

use crate::types::MessageEntity;

/// Synthesizes entity metadata when a caller triggers a command by name
///
/// The synthesized span starts at offset 0 and covers `/` plus the name,
/// i.e. it assumes the update text begins with the command. Callers with
/// the command elsewhere in the text must pass their own entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandEntityResolver;

impl CommandEntityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Use `entity` if given, otherwise synthesize one for `name`
    pub fn resolve(&self, name: &str, entity: Option<MessageEntity>) -> MessageEntity {
        entity.unwrap_or_else(|| Self::default_entity(name))
    }

    /// `{type: bot_command, offset: 0, length: len(name) + 1}`
    ///
    /// Length is in UTF-16 units, the unit of every other entity offset.
    /// For non-ASCII names this differs from a byte count ("café" is 5, not 6).
    pub fn default_entity(name: &str) -> MessageEntity {
        MessageEntity::bot_command(0, name.encode_utf16().count() + 1)
    }
}
