//! Soft continuity warnings between a stored snapshot and a new record.
//!
//! Warnings are informational. The merge still applies the new record.

use crate::payload::CharacterRecord;
use chronicle_core::{ChapterNumber, CharacterState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An implausible change noticed while merging a character record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictWarning {
    /// Power tier changed between consecutive chapters
    RealmJump {
        character: String,
        from: String,
        to: String,
        previous_chapter: ChapterNumber,
        chapter: ChapterNumber,
    },
    /// Location changed between consecutive chapters
    LocationJump {
        character: String,
        from: String,
        to: String,
        previous_chapter: ChapterNumber,
        chapter: ChapterNumber,
    },
    /// A character stored as dead is reported alive
    Resurrection {
        character: String,
        last_seen_chapter: ChapterNumber,
        chapter: ChapterNumber,
    },
}

impl ConflictWarning {
    pub fn character(&self) -> &str {
        match self {
            ConflictWarning::RealmJump { character, .. }
            | ConflictWarning::LocationJump { character, .. }
            | ConflictWarning::Resurrection { character, .. } => character,
        }
    }
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictWarning::RealmJump {
                character,
                from,
                to,
                previous_chapter,
                chapter,
            } => write!(
                f,
                "{}: realm '{}' (chapter {}) -> '{}' (chapter {})",
                character, from, previous_chapter, to, chapter
            ),
            ConflictWarning::LocationJump {
                character,
                from,
                to,
                previous_chapter,
                chapter,
            } => write!(
                f,
                "{}: location '{}' (chapter {}) -> '{}' (chapter {})",
                character, from, previous_chapter, to, chapter
            ),
            ConflictWarning::Resurrection {
                character,
                last_seen_chapter,
                chapter,
            } => write!(
                f,
                "{}: dead as of chapter {} but alive in chapter {}",
                character, last_seen_chapter, chapter
            ),
        }
    }
}

fn differs(stored: Option<&str>, reported: Option<&str>) -> Option<(String, String)> {
    let (from, to) = (stored?.trim(), reported?.trim());
    if from.to_lowercase() == to.to_lowercase() {
        None
    } else {
        Some((from.to_string(), to.to_string()))
    }
}

/// Compare a stored snapshot against a new record for `chapter`.
///
/// Realm and location changes only count when the snapshot is from the
/// same or the immediately preceding chapter. Resurrection is flagged at
/// any distance.
pub fn detect_conflicts(
    stored: Option<&CharacterState>,
    record: &CharacterRecord,
    chapter: ChapterNumber,
) -> Vec<ConflictWarning> {
    let Some(stored) = stored else {
        return Vec::new();
    };
    let mut warnings = Vec::new();
    let consecutive =
        stored.last_seen_chapter <= chapter && chapter - stored.last_seen_chapter <= 1;

    if consecutive {
        if let Some((from, to)) = differs(stored.realm.as_deref(), record.realm.as_deref()) {
            warnings.push(ConflictWarning::RealmJump {
                character: stored.name.clone(),
                from,
                to,
                previous_chapter: stored.last_seen_chapter,
                chapter,
            });
        }
        if let Some((from, to)) = differs(stored.location.as_deref(), record.location.as_deref()) {
            warnings.push(ConflictWarning::LocationJump {
                character: stored.name.clone(),
                from,
                to,
                previous_chapter: stored.last_seen_chapter,
                chapter,
            });
        }
    }

    if !stored.alive && record.alive {
        warnings.push(ConflictWarning::Resurrection {
            character: stored.name.clone(),
            last_seen_chapter: stored.last_seen_chapter,
            chapter,
        });
    }

    warnings
}
