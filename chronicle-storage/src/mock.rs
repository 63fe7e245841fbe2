//! In-memory entity and volume store.

use crate::{ChapterCleanup, EntityStore, QuestUpsert, VolumeStore};
use ::async_trait::async_trait;
use chrono::Utc;
use chronicle_core::{
    ChapterNumber, CharacterState, CharacterUpdate, ChronicleError, ChronicleResult, EntityType,
    GraphEntity, GraphEntityKind, NovelId, OpenQuest, PlanningSettings, QuestStatus,
    RelationshipState, StorageError, VolumeRecord,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type CharacterKey = (NovelId, String);
type RelationshipKey = (NovelId, String, String);
type QuestKey = (NovelId, String);
type GraphKey = (NovelId, GraphEntityKind, String);

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, ChronicleError> {
    lock.read()
        .map_err(|_| ChronicleError::Storage(StorageError::LockPoisoned))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, ChronicleError> {
    lock.write()
        .map_err(|_| ChronicleError::Storage(StorageError::LockPoisoned))
}

/// In-memory store for testing and local tooling.
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MockEntityStore {
    characters: Arc<RwLock<HashMap<CharacterKey, CharacterState>>>,
    relationships: Arc<RwLock<HashMap<RelationshipKey, RelationshipState>>>,
    quests: Arc<RwLock<HashMap<QuestKey, OpenQuest>>>,
    graph: Arc<RwLock<HashMap<GraphKey, GraphEntity>>>,
    volumes: Arc<RwLock<HashMap<NovelId, Vec<VolumeRecord>>>>,
    settings: Arc<RwLock<HashMap<NovelId, PlanningSettings>>>,
    failing: Arc<RwLock<HashSet<EntityType>>>,
    mutations: Arc<AtomicU64>,
}

impl MockEntityStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write for `entity_type` fail.
    pub fn inject_write_failure(&self, entity_type: EntityType) -> ChronicleResult<()> {
        write(&self.failing)?.insert(entity_type);
        Ok(())
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) -> ChronicleResult<()> {
        write(&self.failing)?.clear();
        Ok(())
    }

    /// Number of successful writes since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(AtomicOrdering::SeqCst)
    }

    /// Clear all stored data (volumes and settings included).
    pub fn clear(&self) -> ChronicleResult<()> {
        write(&self.characters)?.clear();
        write(&self.relationships)?.clear();
        write(&self.quests)?.clear();
        write(&self.graph)?.clear();
        write(&self.volumes)?.clear();
        write(&self.settings)?.clear();
        Ok(())
    }

    pub fn character_count(&self) -> ChronicleResult<usize> {
        Ok(read(&self.characters)?.len())
    }

    pub fn relationship_count(&self) -> ChronicleResult<usize> {
        Ok(read(&self.relationships)?.len())
    }

    pub fn quest_count(&self) -> ChronicleResult<usize> {
        Ok(read(&self.quests)?.len())
    }

    pub fn graph_entity_count(&self) -> ChronicleResult<usize> {
        Ok(read(&self.graph)?.len())
    }

    /// Replace the persisted volumes for a novel.
    pub fn set_volumes(&self, novel_id: NovelId, volumes: Vec<VolumeRecord>) -> ChronicleResult<()> {
        write(&self.volumes)?.insert(novel_id, volumes);
        Ok(())
    }

    pub fn set_planning_settings(
        &self,
        novel_id: NovelId,
        settings: PlanningSettings,
    ) -> ChronicleResult<()> {
        write(&self.settings)?.insert(novel_id, settings);
        Ok(())
    }

    fn check_write(&self, entity_type: EntityType) -> ChronicleResult<()> {
        if read(&self.failing)?.contains(&entity_type) {
            return Err(ChronicleError::Storage(StorageError::InsertFailed {
                entity_type,
                reason: "injected write failure".to_string(),
            }));
        }
        Ok(())
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

fn by_relevance_desc(a: &GraphEntity, b: &GraphEntity) -> Ordering {
    let ra = a.relevance_score.unwrap_or(f64::NEG_INFINITY);
    let rb = b.relevance_score.unwrap_or(f64::NEG_INFINITY);
    rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
}

#[async_trait]
impl EntityStore for MockEntityStore {
    async fn upsert_character_state(
        &self,
        novel_id: NovelId,
        update: &CharacterUpdate,
    ) -> ChronicleResult<()> {
        self.check_write(EntityType::CharacterState)?;
        let mut characters = write(&self.characters)?;
        characters
            .entry((novel_id, update.name.clone()))
            .and_modify(|state| state.apply(update))
            .or_insert_with(|| {
                let mut state = CharacterState::new(novel_id, update.name.clone(), update.chapter);
                state.apply(update);
                state
            });
        drop(characters);
        self.record_mutation();
        Ok(())
    }

    async fn update_character_inventory(
        &self,
        novel_id: NovelId,
        name: &str,
        items: &[String],
        chapter: ChapterNumber,
    ) -> ChronicleResult<()> {
        self.check_write(EntityType::CharacterState)?;
        let mut characters = write(&self.characters)?;
        let state = characters
            .get_mut(&(novel_id, name.to_string()))
            .ok_or_else(|| {
                ChronicleError::Storage(StorageError::NotFound {
                    entity_type: EntityType::CharacterState,
                    id: name.to_string(),
                })
            })?;
        state.inventory = items.to_vec();
        state.last_seen_chapter = state.last_seen_chapter.max(chapter);
        state.updated_at = Utc::now();
        drop(characters);
        self.record_mutation();
        Ok(())
    }

    async fn get_character_state(
        &self,
        novel_id: NovelId,
        name: &str,
    ) -> ChronicleResult<Option<CharacterState>> {
        let characters = read(&self.characters)?;
        Ok(characters.get(&(novel_id, name.to_string())).cloned())
    }

    async fn get_character_states(
        &self,
        novel_id: NovelId,
        limit: usize,
    ) -> ChronicleResult<Vec<CharacterState>> {
        let characters = read(&self.characters)?;
        let mut states: Vec<CharacterState> = characters
            .values()
            .filter(|c| c.novel_id == novel_id)
            .cloned()
            .collect();
        states.sort_by(|a, b| {
            b.last_seen_chapter
                .cmp(&a.last_seen_chapter)
                .then_with(|| a.name.cmp(&b.name))
        });
        states.truncate(limit);
        Ok(states)
    }

    async fn upsert_relationship(&self, relationship: &RelationshipState) -> ChronicleResult<()> {
        self.check_write(EntityType::Relationship)?;
        let (a, b) = relationship.pair();
        write(&self.relationships)?.insert((relationship.novel_id, a, b), relationship.clone());
        self.record_mutation();
        Ok(())
    }

    async fn get_top_relationships(
        &self,
        novel_id: NovelId,
        limit: usize,
    ) -> ChronicleResult<Vec<RelationshipState>> {
        let relationships = read(&self.relationships)?;
        let mut rows: Vec<RelationshipState> = relationships
            .values()
            .filter(|r| r.novel_id == novel_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.last_updated_chapter.cmp(&a.last_updated_chapter))
                .then_with(|| a.pair().cmp(&b.pair()))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn upsert_open_quest(&self, quest: &OpenQuest) -> ChronicleResult<QuestUpsert> {
        self.check_write(EntityType::OpenQuest)?;
        let mut quests = write(&self.quests)?;
        let key = (quest.novel_id, quest.id.clone());
        let outcome = match quests.get_mut(&key) {
            Some(existing) if existing.status.is_terminal() => QuestUpsert::AlreadyResolved,
            Some(existing) => {
                if quest.last_progress.is_some() {
                    existing.last_progress = quest.last_progress.clone();
                }
                if existing.description.trim().is_empty() {
                    existing.description = quest.description.clone();
                }
                existing.due_chapter = quest.due_chapter;
                existing.last_updated_chapter =
                    existing.last_updated_chapter.max(quest.last_updated_chapter);
                existing.updated_at = Utc::now();
                QuestUpsert::Updated
            }
            None => {
                let mut stored = quest.clone();
                stored.status = QuestStatus::Open;
                quests.insert(key, stored);
                QuestUpsert::Created
            }
        };
        drop(quests);
        if outcome != QuestUpsert::AlreadyResolved {
            self.record_mutation();
        }
        Ok(outcome)
    }

    async fn resolve_open_quest(
        &self,
        novel_id: NovelId,
        quest_id: &str,
        chapter: ChapterNumber,
    ) -> ChronicleResult<bool> {
        self.check_write(EntityType::OpenQuest)?;
        let mut quests = write(&self.quests)?;
        let Some(quest) = quests.get_mut(&(novel_id, quest_id.to_string())) else {
            return Ok(false);
        };
        if quest.status.is_terminal() {
            return Ok(false);
        }
        quest.status = QuestStatus::Resolved;
        quest.last_updated_chapter = quest.last_updated_chapter.max(chapter);
        quest.updated_at = Utc::now();
        drop(quests);
        self.record_mutation();
        Ok(true)
    }

    async fn get_open_quest(
        &self,
        novel_id: NovelId,
        quest_id: &str,
    ) -> ChronicleResult<Option<OpenQuest>> {
        let quests = read(&self.quests)?;
        Ok(quests.get(&(novel_id, quest_id.to_string())).cloned())
    }

    async fn get_open_quests(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
    ) -> ChronicleResult<Vec<OpenQuest>> {
        let quests = read(&self.quests)?;
        let mut open: Vec<OpenQuest> = quests
            .values()
            .filter(|q| {
                q.novel_id == novel_id
                    && q.status == QuestStatus::Open
                    && q.introduced_chapter <= chapter
            })
            .cloned()
            .collect();
        open.sort_by(|a, b| a.due_chapter.cmp(&b.due_chapter).then_with(|| a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn insert_graph_entity(
        &self,
        novel_id: NovelId,
        entity: &GraphEntity,
    ) -> ChronicleResult<()> {
        self.check_write(EntityType::from(entity.kind))?;
        write(&self.graph)?.insert((novel_id, entity.kind, entity.id.clone()), entity.clone());
        self.record_mutation();
        Ok(())
    }

    async fn get_graph_entities(
        &self,
        novel_id: NovelId,
        kind: GraphEntityKind,
        chapter: ChapterNumber,
        limit: usize,
    ) -> ChronicleResult<Vec<GraphEntity>> {
        let graph = read(&self.graph)?;
        let mut nodes: Vec<GraphEntity> = graph
            .iter()
            .filter(|((novel, k, _), entity)| {
                *novel == novel_id && *k == kind && entity.chapter_number <= chapter
            })
            .map(|(_, entity)| entity.clone())
            .collect();
        nodes.sort_by(|a, b| {
            b.chapter_number
                .cmp(&a.chapter_number)
                .then_with(|| by_relevance_desc(a, b))
                .then_with(|| a.id.cmp(&b.id))
        });
        nodes.truncate(limit);
        Ok(nodes)
    }

    async fn delete_chapter_entities(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
    ) -> ChronicleResult<ChapterCleanup> {
        let mut cleanup = ChapterCleanup::default();

        {
            let mut graph = write(&self.graph)?;
            let before = graph.len();
            graph.retain(|(novel, _, _), e| !(*novel == novel_id && e.chapter_number == chapter));
            cleanup.graph_entities = before - graph.len();
        }
        {
            let mut relationships = write(&self.relationships)?;
            let before = relationships.len();
            relationships
                .retain(|_, r| !(r.novel_id == novel_id && r.last_updated_chapter == chapter));
            cleanup.relationships = before - relationships.len();
        }
        {
            let mut quests = write(&self.quests)?;
            let before = quests.len();
            quests.retain(|_, q| !(q.novel_id == novel_id && q.introduced_chapter == chapter));
            cleanup.quests = before - quests.len();
        }
        {
            let mut characters = write(&self.characters)?;
            let before = characters.len();
            characters
                .retain(|_, c| !(c.novel_id == novel_id && c.first_seen_chapter == chapter));
            cleanup.characters = before - characters.len();
        }

        if cleanup.total() > 0 {
            self.record_mutation();
        }
        tracing::debug!(
            novel_id = %novel_id,
            chapter,
            removed = cleanup.total(),
            "chapter entities deleted"
        );
        Ok(cleanup)
    }
}

#[async_trait]
impl VolumeStore for MockEntityStore {
    async fn list_volumes(&self, novel_id: NovelId) -> ChronicleResult<Vec<VolumeRecord>> {
        let volumes = read(&self.volumes)?;
        Ok(volumes.get(&novel_id).cloned().unwrap_or_default())
    }

    async fn planning_settings(&self, novel_id: NovelId) -> ChronicleResult<PlanningSettings> {
        let settings = read(&self.settings)?;
        Ok(settings.get(&novel_id).copied().unwrap_or_default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::new_novel_id;
    use serde_json::json;

    #[tokio::test]
    async fn test_character_upsert_merges_fields() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();

        store
            .upsert_character_state(
                novel,
                &CharacterUpdate::seen("Lin Feng", 2).with_location("Azure Peak"),
            )
            .await
            .unwrap();
        store
            .upsert_character_state(novel, &CharacterUpdate::seen("Lin Feng", 4).with_realm("Core"))
            .await
            .unwrap();

        let state = store.get_character_state(novel, "Lin Feng").await.unwrap().unwrap();
        assert_eq!(state.location.as_deref(), Some("Azure Peak"));
        assert_eq!(state.realm.as_deref(), Some("Core"));
        assert_eq!(state.first_seen_chapter, 2);
        assert_eq!(state.last_seen_chapter, 4);
        assert_eq!(store.character_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inventory_requires_existing_character() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        let err = store
            .update_character_inventory(novel, "Nobody", &["sword".to_string()], 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChronicleError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_character_states_ordered_by_recency() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        for (name, chapter) in [("A", 1), ("B", 9), ("C", 5)] {
            store
                .upsert_character_state(novel, &CharacterUpdate::seen(name, chapter))
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .get_character_states(novel, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_relationship_pair_is_unordered() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        store
            .upsert_relationship(&RelationshipState::new(novel, "A", "B", "ally", 0.8, 3))
            .await
            .unwrap();
        store
            .upsert_relationship(&RelationshipState::new(novel, "B", "A", "enemy", 0.9, 4))
            .await
            .unwrap();

        let rows = store.get_top_relationships(novel, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].relation_type, "enemy");
        assert_eq!(rows[0].strength, 0.9);
    }

    #[tokio::test]
    async fn test_quest_lifecycle() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();

        let first = OpenQuest::open(novel, "find_the_sword", "Find the sword", 3, 8);
        assert_eq!(store.upsert_open_quest(&first).await.unwrap(), QuestUpsert::Created);

        let later = OpenQuest::open(novel, "find_the_sword", "Find the sword", 6, 16)
            .with_progress("stalled");
        assert_eq!(store.upsert_open_quest(&later).await.unwrap(), QuestUpsert::Updated);

        let stored = store.get_open_quest(novel, "find_the_sword").await.unwrap().unwrap();
        assert_eq!(stored.introduced_chapter, 3);
        assert_eq!(stored.due_chapter, 16);
        assert_eq!(stored.last_progress.as_deref(), Some("stalled"));

        assert!(store.resolve_open_quest(novel, "find_the_sword", 9).await.unwrap());
        assert!(!store.resolve_open_quest(novel, "find_the_sword", 10).await.unwrap());
        assert_eq!(
            store.upsert_open_quest(&later).await.unwrap(),
            QuestUpsert::AlreadyResolved
        );

        let stored = store.get_open_quest(novel, "find_the_sword").await.unwrap().unwrap();
        assert_eq!(stored.status, QuestStatus::Resolved);
        assert!(store.get_open_quests(novel, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_missing_quest_is_false() {
        let store = MockEntityStore::new();
        assert!(!store
            .resolve_open_quest(new_novel_id(), "ghost", 1)
            .await
            .unwrap());
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_open_quests_sorted_by_due() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        store
            .upsert_open_quest(&OpenQuest::open(novel, "b", "B", 1, 20))
            .await
            .unwrap();
        store
            .upsert_open_quest(&OpenQuest::open(novel, "a", "A", 2, 7))
            .await
            .unwrap();
        store
            .upsert_open_quest(&OpenQuest::open(novel, "future", "F", 30, 35))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .get_open_quests(novel, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_graph_entities_filtered_and_ordered() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        let entities = [
            GraphEntity::new("e1", GraphEntityKind::Event, 2).with_relevance(9.0),
            GraphEntity::new("e2", GraphEntityKind::Event, 7),
            GraphEntity::new("e3", GraphEntityKind::Event, 7).with_relevance(3.0),
            GraphEntity::new("e4", GraphEntityKind::Event, 12),
            GraphEntity::new("f1", GraphEntityKind::Foreshadow, 1)
                .with_property("name", json!("omen")),
        ];
        for entity in &entities {
            store.insert_graph_entity(novel, entity).await.unwrap();
        }

        let ids: Vec<String> = store
            .get_graph_entities(novel, GraphEntityKind::Event, 10, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["e3", "e2", "e1"]);

        let limited = store
            .get_graph_entities(novel, GraphEntityKind::Event, 10, 1)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_chapter_entities() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        let other = new_novel_id();

        store
            .upsert_character_state(novel, &CharacterUpdate::seen("New", 5))
            .await
            .unwrap();
        store
            .upsert_character_state(novel, &CharacterUpdate::seen("Old", 1))
            .await
            .unwrap();
        store
            .upsert_relationship(&RelationshipState::new(novel, "New", "Old", "ally", 0.8, 5))
            .await
            .unwrap();
        store
            .upsert_open_quest(&OpenQuest::open(novel, "q", "Q", 5, 10))
            .await
            .unwrap();
        store
            .insert_graph_entity(novel, &GraphEntity::new("e", GraphEntityKind::Event, 5))
            .await
            .unwrap();
        store
            .insert_graph_entity(other, &GraphEntity::new("e", GraphEntityKind::Event, 5))
            .await
            .unwrap();

        let cleanup = store.delete_chapter_entities(novel, 5).await.unwrap();
        assert_eq!(
            cleanup,
            ChapterCleanup {
                graph_entities: 1,
                characters: 1,
                relationships: 1,
                quests: 1,
            }
        );
        assert_eq!(store.character_count().unwrap(), 1);
        assert_eq!(store.graph_entity_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_blocks_only_that_type() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        store.inject_write_failure(EntityType::Relationship).unwrap();

        assert!(store
            .upsert_relationship(&RelationshipState::new(novel, "A", "B", "ally", 0.8, 1))
            .await
            .is_err());
        assert!(store
            .upsert_character_state(novel, &CharacterUpdate::seen("A", 1))
            .await
            .is_ok());
        assert_eq!(store.mutation_count(), 1);

        store.clear_failures().unwrap();
        assert!(store
            .upsert_relationship(&RelationshipState::new(novel, "A", "B", "ally", 0.8, 1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_volume_store_defaults() {
        let store = MockEntityStore::new();
        let novel = new_novel_id();
        assert!(store.list_volumes(novel).await.unwrap().is_empty());
        assert!(store.planning_settings(novel).await.unwrap().is_empty());

        store
            .set_volumes(novel, vec![VolumeRecord::new(1, 1, 100)])
            .unwrap();
        store
            .set_planning_settings(novel, PlanningSettings::new(5, 500))
            .unwrap();
        assert_eq!(store.list_volumes(novel).await.unwrap().len(), 1);
        assert_eq!(
            store.planning_settings(novel).await.unwrap().target_total_chapters(),
            Some(500)
        );
    }
}
