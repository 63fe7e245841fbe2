//! Core entity structures

use crate::{relation_pair, ChapterNumber, GraphEntityKind, NovelId, QuestStatus, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// CHARACTER STATE
// ============================================================================

/// Latest known snapshot for one canonical character identity.
///
/// The `name` is the canonical key. Once it carries a disambiguating
/// qualifier (e.g. `"Lin Feng (elder)"`) every later write for the same
/// individual must reuse it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CharacterState {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub novel_id: NovelId,
    pub name: String,
    pub location: Option<String>,
    /// Power / cultivation tier as free text
    pub realm: Option<String>,
    pub alive: bool,
    /// Free-text status annotation (injured, in seclusion, ...)
    pub status: Option<String>,
    pub inventory: Vec<String>,
    pub first_seen_chapter: ChapterNumber,
    pub last_seen_chapter: ChapterNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl CharacterState {
    /// Create a fresh snapshot for a character first seen in `chapter`.
    pub fn new(novel_id: NovelId, name: impl Into<String>, chapter: ChapterNumber) -> Self {
        Self {
            novel_id,
            name: name.into(),
            location: None,
            realm: None,
            alive: true,
            status: None,
            inventory: Vec::new(),
            first_seen_chapter: chapter,
            last_seen_chapter: chapter,
            updated_at: Utc::now(),
        }
    }

    /// Apply an update in place. Absent fields keep their stored value.
    pub fn apply(&mut self, update: &CharacterUpdate) {
        if let Some(ref location) = update.location {
            self.location = Some(location.clone());
        }
        if let Some(ref realm) = update.realm {
            self.realm = Some(realm.clone());
        }
        if let Some(ref status) = update.status {
            self.status = Some(status.clone());
        }
        self.alive = update.alive;
        self.last_seen_chapter = self.last_seen_chapter.max(update.chapter);
        self.first_seen_chapter = self.first_seen_chapter.min(update.chapter);
        self.updated_at = Utc::now();
    }
}

/// Upsert payload for a character snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterUpdate {
    pub name: String,
    pub location: Option<String>,
    pub realm: Option<String>,
    pub alive: bool,
    pub status: Option<String>,
    pub chapter: ChapterNumber,
}

impl CharacterUpdate {
    /// Create an update that only marks the character as seen (and alive).
    pub fn seen(name: impl Into<String>, chapter: ChapterNumber) -> Self {
        Self {
            name: name.into(),
            location: None,
            realm: None,
            alive: true,
            status: None,
            chapter,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_alive(mut self, alive: bool) -> Self {
        self.alive = alive;
        self
    }
}

// ============================================================================
// RELATIONSHIP STATE
// ============================================================================

/// Latest relationship between an unordered pair of canonical characters.
/// `character_a` always sorts before `character_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RelationshipState {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub novel_id: NovelId,
    pub character_a: String,
    pub character_b: String,
    pub relation_type: String,
    /// Strength in [0, 1]
    pub strength: f64,
    pub last_updated_chapter: ChapterNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl RelationshipState {
    /// Build a relationship row, ordering the pair canonically and clamping
    /// strength into [0, 1].
    pub fn new(
        novel_id: NovelId,
        a: &str,
        b: &str,
        relation_type: impl Into<String>,
        strength: f64,
        chapter: ChapterNumber,
    ) -> Self {
        let (character_a, character_b) = relation_pair(a, b);
        Self {
            novel_id,
            character_a,
            character_b,
            relation_type: relation_type.into(),
            strength: strength.clamp(0.0, 1.0),
            last_updated_chapter: chapter,
            updated_at: Utc::now(),
        }
    }

    /// The storage key for this row.
    pub fn pair(&self) -> (String, String) {
        (self.character_a.clone(), self.character_b.clone())
    }

    /// Whether `name` is one side of this relationship.
    pub fn involves(&self, name: &str) -> bool {
        self.character_a == name || self.character_b == name
    }
}

// ============================================================================
// OPEN QUEST
// ============================================================================

/// A tracked narrative obligation with an introduced / due / resolved lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OpenQuest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub novel_id: NovelId,
    /// Normalized id, see [`crate::normalize_quest_id`]
    pub id: String,
    pub description: String,
    /// Most recent progress phrase reported for this quest
    pub last_progress: Option<String>,
    pub status: QuestStatus,
    pub introduced_chapter: ChapterNumber,
    pub due_chapter: ChapterNumber,
    pub last_updated_chapter: ChapterNumber,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl OpenQuest {
    /// Create an open quest introduced in `chapter`.
    pub fn open(
        novel_id: NovelId,
        id: impl Into<String>,
        description: impl Into<String>,
        chapter: ChapterNumber,
        due_chapter: ChapterNumber,
    ) -> Self {
        Self {
            novel_id,
            id: id.into(),
            description: description.into(),
            last_progress: None,
            status: QuestStatus::Open,
            introduced_chapter: chapter,
            due_chapter,
            last_updated_chapter: chapter,
            updated_at: Utc::now(),
        }
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.last_progress = Some(progress.into());
        self
    }

    /// Whether the quest is still open and its due chapter has passed.
    pub fn is_overdue(&self, chapter: ChapterNumber) -> bool {
        self.status == QuestStatus::Open && self.due_chapter < chapter
    }
}

// ============================================================================
// NARRATIVE GRAPH ENTITIES
// ============================================================================

/// Property keys that may carry a human-readable name, in lookup order.
const NAME_KEYS: [&str; 3] = ["name", "title", "label"];

/// Property keys that may carry a description, in lookup order.
const DESCRIPTION_KEYS: [&str; 3] = ["description", "summary", "content"];

/// A narrative graph node (event, foreshadow, plotline, conflict arc,
/// character arc or character profile).
///
/// Written by collaborators outside this workspace; read by context assembly
/// under a uniform scoring contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GraphEntity {
    pub id: String,
    pub kind: GraphEntityKind,
    pub chapter_number: ChapterNumber,
    /// Optional retrieval relevance signal (unbounded, typically 0-10)
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl GraphEntity {
    pub fn new(id: impl Into<String>, kind: GraphEntityKind, chapter_number: ChapterNumber) -> Self {
        Self {
            id: id.into(),
            kind,
            chapter_number,
            relevance_score: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    /// Non-blank string property.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numeric property (JSON numbers only).
    pub fn prop_f64(&self, key: &str) -> Option<f64> {
        self.properties
            .get(key)
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite())
    }

    /// Display name, falling back to the id.
    pub fn name(&self) -> &str {
        NAME_KEYS
            .iter()
            .find_map(|key| self.prop_str(key))
            .unwrap_or(&self.id)
    }

    pub fn description(&self) -> Option<&str> {
        DESCRIPTION_KEYS.iter().find_map(|key| self.prop_str(key))
    }
}

// ============================================================================
// VOLUMES
// ============================================================================

/// A persisted volume (macro arc) record. Boundaries may be missing while a
/// volume is only partially planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VolumeRecord {
    pub number: u32,
    pub start_chapter: Option<ChapterNumber>,
    pub end_chapter: Option<ChapterNumber>,
}

impl VolumeRecord {
    pub fn new(number: u32, start: ChapterNumber, end: ChapterNumber) -> Self {
        Self {
            number,
            start_chapter: Some(start),
            end_chapter: Some(end),
        }
    }

    /// Both boundaries present and ordered.
    pub fn bounds(&self) -> Option<(ChapterNumber, ChapterNumber)> {
        match (self.start_chapter, self.end_chapter) {
            (Some(start), Some(end)) if start <= end => Some((start, end)),
            _ => None,
        }
    }
}

/// Novel-level planning settings. Zero values are treated as unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlanningSettings {
    pub planned_volume_count: Option<u32>,
    pub target_total_chapters: Option<u32>,
}

impl PlanningSettings {
    pub fn new(planned_volume_count: u32, target_total_chapters: u32) -> Self {
        Self {
            planned_volume_count: Some(planned_volume_count),
            target_total_chapters: Some(target_total_chapters),
        }
    }

    pub fn planned_volume_count(&self) -> Option<u32> {
        self.planned_volume_count.filter(|v| *v > 0)
    }

    pub fn target_total_chapters(&self) -> Option<u32> {
        self.target_total_chapters.filter(|v| *v > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.planned_volume_count().is_none() && self.target_total_chapters().is_none()
    }
}

// ============================================================================
// CHAPTER TEXT
// ============================================================================

/// Full text of a recently written chapter, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterText {
    pub chapter_number: ChapterNumber,
    pub title: String,
    pub content: String,
}

/// Summary of a previously written chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChapterSummary {
    pub chapter_number: ChapterNumber,
    pub summary: String,
}
