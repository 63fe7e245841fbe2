//! Outcome of one extraction and merge pass.

use crate::conflict::ConflictWarning;
use chronicle_core::{ChapterNumber, NovelId};
use serde::{Deserialize, Serialize};

/// How far a pass got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    /// The record was parsed and merged; individual writes may still have failed
    Applied,
    /// The text generation call failed; nothing was written
    GenerationFailed,
    /// The generated text held no usable record; nothing was written
    Malformed,
}

/// Counts, soft warnings and isolated failures from one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub novel_id: NovelId,
    pub chapter: ChapterNumber,
    pub status: MergeStatus,
    pub characters_upserted: usize,
    pub inventories_updated: usize,
    pub relationships_upserted: usize,
    pub quests_opened: usize,
    pub quests_progressed: usize,
    pub quests_resolved: usize,
    /// Records dropped before any write (blank names, unusable quest names)
    pub skipped: usize,
    pub warnings: Vec<ConflictWarning>,
    /// One line per failed store call
    pub failures: Vec<String>,
    /// Why the pass stopped early, for non-applied statuses
    pub error: Option<String>,
}

impl MergeReport {
    pub fn applied(novel_id: NovelId, chapter: ChapterNumber) -> Self {
        Self {
            novel_id,
            chapter,
            status: MergeStatus::Applied,
            characters_upserted: 0,
            inventories_updated: 0,
            relationships_upserted: 0,
            quests_opened: 0,
            quests_progressed: 0,
            quests_resolved: 0,
            skipped: 0,
            warnings: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    pub fn generation_failed(
        novel_id: NovelId,
        chapter: ChapterNumber,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: MergeStatus::GenerationFailed,
            error: Some(error.into()),
            ..Self::applied(novel_id, chapter)
        }
    }

    pub fn malformed(novel_id: NovelId, chapter: ChapterNumber, error: impl Into<String>) -> Self {
        Self {
            status: MergeStatus::Malformed,
            error: Some(error.into()),
            ..Self::applied(novel_id, chapter)
        }
    }

    /// Successful store writes performed by the pass.
    pub fn writes(&self) -> usize {
        self.characters_upserted
            + self.inventories_updated
            + self.relationships_upserted
            + self.quests_opened
            + self.quests_progressed
            + self.quests_resolved
    }

    /// Applied with no failed writes.
    pub fn is_clean(&self) -> bool {
        self.status == MergeStatus::Applied && self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::new_novel_id;

    #[test]
    fn test_failed_reports_write_nothing() {
        let novel = new_novel_id();
        let report = MergeReport::generation_failed(novel, 4, "timeout");
        assert_eq!(report.status, MergeStatus::GenerationFailed);
        assert_eq!(report.writes(), 0);
        assert!(!report.is_clean());
        assert_eq!(report.error.as_deref(), Some("timeout"));

        let report = MergeReport::malformed(novel, 4, "no json");
        assert_eq!(report.status, MergeStatus::Malformed);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&MergeStatus::GenerationFailed).unwrap();
        assert_eq!(json, "\"generation_failed\"");
    }
}
