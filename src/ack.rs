//! Batch acknowledgment by cursor advance
//!
//! A pull source considers an update consumed once a fetch is issued with
//! an offset above its id. The tracker remembers the highest id seen in a
//! cycle and, after the whole batch is dispatched, issues that fetch.

use crate::source::UpdateSource;
use crate::types::AckStatus;

/// Running maximum of update ids seen in one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcknowledgmentTracker {
    highest: Option<i64>,
}

impl AcknowledgmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched update id
    pub fn observe(&mut self, update_id: i64) {
        self.highest = Some(self.highest.map_or(update_id, |h| h.max(update_id)));
    }

    /// Highest id observed, if any
    pub fn highest(&self) -> Option<i64> {
        self.highest
    }

    /// Offset that confirms everything observed
    ///
    /// `None` when nothing was observed or the highest id is `i64::MAX`.
    pub fn next_offset(&self) -> Option<i64> {
        self.highest.and_then(|h| h.checked_add(1))
    }

    /// Advance the source cursor past the highest observed id
    ///
    /// Does nothing when no update was observed. The housekeeping batch
    /// returned by the source is discarded. A failed request is reported
    /// as [`AckStatus::Failed`]; the caller's dispatch results stand.
    pub async fn acknowledge(&self, source: &dyn UpdateSource) -> AckStatus {
        let Some(highest) = self.highest else {
            tracing::debug!(source = source.name(), "Empty batch, skipping acknowledgment");
            return AckStatus::Skipped;
        };
        let Some(offset) = self.next_offset() else {
            tracing::warn!(
                source = source.name(),
                update_id = highest,
                "No offset exists past this update id, batch may be redelivered"
            );
            return AckStatus::Failed {
                offset: highest,
                reason: format!("update id {} has no following offset", highest),
            };
        };

        match source.advance_cursor(offset).await {
            Ok(_) => {
                tracing::debug!(source = source.name(), offset, "Updates acknowledged");
                AckStatus::Confirmed { offset }
            }
            Err(e) => {
                tracing::warn!(
                    source = source.name(),
                    offset,
                    error = %e,
                    "Failed to acknowledge updates, batch may be redelivered"
                );
                AckStatus::Failed {
                    offset,
                    reason: e.to_string(),
                }
            }
        }
    }
}
