//! Acknowledged offset persistence
//!
//! Pull sources may persist the last acknowledged offset so a restarted
//! process resumes where it left off instead of relying on the remote
//! side alone.

use crate::error::{CommandError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted cursor position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorRecord {
    /// Next offset to request
    pub offset: i64,
    pub updated_at: DateTime<Utc>,
}

/// Trait for persisting the acknowledged offset
pub trait CursorStore: Send + Sync {
    /// Save the next offset to request
    fn save(&self, offset: i64) -> Result<()>;

    /// Load the saved offset, if any
    fn load(&self) -> Result<Option<i64>>;
}

/// JSON file-based cursor store
///
/// Atomic writes via temp file + rename.
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn save(&self, offset: i64) -> Result<()> {
        let record = CursorRecord {
            offset,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CommandError::Cursor(format!(
                    "Failed to create cursor directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            CommandError::Cursor(format!(
                "Failed to write cursor file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            CommandError::Cursor(format!(
                "Failed to rename cursor file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), offset, "Cursor saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<i64>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            CommandError::Cursor(format!(
                "Failed to read cursor file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let record: CursorRecord = serde_json::from_str(&json).map_err(|e| {
            CommandError::Cursor(format!(
                "Failed to parse cursor file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), offset = record.offset, "Cursor loaded");
        Ok(Some(record.offset))
    }
}

/// In-memory cursor store for testing
#[derive(Default)]
pub struct MemoryCursorStore {
    offset: std::sync::RwLock<Option<i64>>,
}

impl CursorStore for MemoryCursorStore {
    fn save(&self, offset: i64) -> Result<()> {
        let mut current = self
            .offset
            .write()
            .map_err(|e| CommandError::Cursor(format!("Failed to acquire cursor lock: {}", e)))?;
        *current = Some(offset);
        Ok(())
    }

    fn load(&self) -> Result<Option<i64>> {
        let current = self
            .offset
            .read()
            .map_err(|e| CommandError::Cursor(format!("Failed to acquire cursor lock: {}", e)))?;
        Ok(*current)
    }
}
