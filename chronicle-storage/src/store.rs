//! Async store traits consumed by the continuity engines.
//!
//! Implementations are external collaborators (a database, a document
//! store). The in-memory [`crate::MockEntityStore`] backs tests and the CLI.

use ::async_trait::async_trait;
use chronicle_core::{
    ChapterNumber, CharacterState, CharacterUpdate, ChronicleResult, GraphEntity,
    GraphEntityKind, NovelId, OpenQuest, PlanningSettings, RelationshipState, VolumeRecord,
};
use serde::{Deserialize, Serialize};

/// Outcome of an open-quest upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestUpsert {
    /// A new OPEN quest was stored
    Created,
    /// An existing OPEN quest had its progress and due chapter refreshed
    Updated,
    /// The quest is already RESOLVED; nothing was written
    AlreadyResolved,
}

/// Row counts removed by a chapter-scoped cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterCleanup {
    pub graph_entities: usize,
    pub characters: usize,
    pub relationships: usize,
    pub quests: usize,
}

impl ChapterCleanup {
    pub fn total(&self) -> usize {
        self.graph_entities + self.characters + self.relationships + self.quests
    }
}

/// Entity store keyed by (novel, entity type, entity id).
#[async_trait]
pub trait EntityStore: Send + Sync {
    // ========================================================================
    // CHARACTER OPERATIONS
    // ========================================================================

    /// Insert or update a character snapshot. Absent update fields keep the
    /// stored value; inventory is never touched here.
    async fn upsert_character_state(
        &self,
        novel_id: NovelId,
        update: &CharacterUpdate,
    ) -> ChronicleResult<()>;

    /// Replace a character's inventory.
    async fn update_character_inventory(
        &self,
        novel_id: NovelId,
        name: &str,
        items: &[String],
        chapter: ChapterNumber,
    ) -> ChronicleResult<()>;

    /// Get one character by canonical name.
    async fn get_character_state(
        &self,
        novel_id: NovelId,
        name: &str,
    ) -> ChronicleResult<Option<CharacterState>>;

    /// Most recently seen characters first.
    async fn get_character_states(
        &self,
        novel_id: NovelId,
        limit: usize,
    ) -> ChronicleResult<Vec<CharacterState>>;

    // ========================================================================
    // RELATIONSHIP OPERATIONS
    // ========================================================================

    /// Insert or overwrite the row for an unordered pair.
    async fn upsert_relationship(&self, relationship: &RelationshipState) -> ChronicleResult<()>;

    /// Strongest relationships first.
    async fn get_top_relationships(
        &self,
        novel_id: NovelId,
        limit: usize,
    ) -> ChronicleResult<Vec<RelationshipState>>;

    // ========================================================================
    // QUEST OPERATIONS
    // ========================================================================

    /// Insert or refresh an OPEN quest. Resolved quests are left untouched
    /// and an existing quest keeps its introduced chapter.
    async fn upsert_open_quest(&self, quest: &OpenQuest) -> ChronicleResult<QuestUpsert>;

    /// Mark a quest RESOLVED. Returns `true` only when this call performed
    /// the transition; missing or already-resolved quests return `false`.
    async fn resolve_open_quest(
        &self,
        novel_id: NovelId,
        quest_id: &str,
        chapter: ChapterNumber,
    ) -> ChronicleResult<bool>;

    /// Get one quest by normalized id, whatever its status.
    async fn get_open_quest(
        &self,
        novel_id: NovelId,
        quest_id: &str,
    ) -> ChronicleResult<Option<OpenQuest>>;

    /// OPEN quests introduced at or before `chapter`, earliest due first.
    async fn get_open_quests(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
    ) -> ChronicleResult<Vec<OpenQuest>>;

    // ========================================================================
    // NARRATIVE GRAPH OPERATIONS
    // ========================================================================

    /// Insert or replace a graph node (keyed by kind and id).
    async fn insert_graph_entity(
        &self,
        novel_id: NovelId,
        entity: &GraphEntity,
    ) -> ChronicleResult<()>;

    /// Nodes of one kind at or before `chapter`, most recent first, ties
    /// broken by relevance.
    async fn get_graph_entities(
        &self,
        novel_id: NovelId,
        kind: GraphEntityKind,
        chapter: ChapterNumber,
        limit: usize,
    ) -> ChronicleResult<Vec<GraphEntity>>;

    // ========================================================================
    // CLEANUP
    // ========================================================================

    /// Remove everything a chapter contributed: graph nodes from that
    /// chapter, relationships last updated there, quests introduced there
    /// and characters first seen there.
    async fn delete_chapter_entities(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
    ) -> ChronicleResult<ChapterCleanup>;
}

/// Volume records and novel-level planning settings.
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// All persisted volumes for a novel, in any order.
    async fn list_volumes(&self, novel_id: NovelId) -> ChronicleResult<Vec<VolumeRecord>>;

    /// Planning settings; all fields unset when the novel has none.
    async fn planning_settings(&self, novel_id: NovelId) -> ChronicleResult<PlanningSettings>;
}
