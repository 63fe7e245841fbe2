//! Raw candidate material for one chapter's context.

use chronicle_core::{
    BudgetPolicy, ChapterNumber, ChapterSummary, ChapterText, CharacterState, GraphEntity,
    GraphEntityKind, NovelId, OpenQuest, RelationshipState,
};
use chronicle_storage::EntityStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Everything context assembly may draw from, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextCandidates {
    #[serde(default)]
    pub events: Vec<GraphEntity>,
    #[serde(default)]
    pub foreshadows: Vec<GraphEntity>,
    #[serde(default)]
    pub plotlines: Vec<GraphEntity>,
    #[serde(default)]
    pub conflict_arcs: Vec<GraphEntity>,
    #[serde(default)]
    pub character_arcs: Vec<GraphEntity>,
    #[serde(default)]
    pub character_profiles: Vec<GraphEntity>,
    #[serde(default)]
    pub characters: Vec<CharacterState>,
    #[serde(default)]
    pub relationships: Vec<RelationshipState>,
    #[serde(default)]
    pub open_quests: Vec<OpenQuest>,
    #[serde(default)]
    pub recent_chapters: Vec<ChapterText>,
    #[serde(default)]
    pub summaries: Vec<ChapterSummary>,
}

impl ContextCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events, foreshadows, conflict arcs and character arcs combined.
    /// This is the count the bypass rule looks at.
    pub fn graph_count(&self) -> usize {
        self.events.len()
            + self.foreshadows.len()
            + self.conflict_arcs.len()
            + self.character_arcs.len()
    }

    /// Route a graph entity into the list for its kind.
    pub fn push_entity(&mut self, entity: GraphEntity) {
        self.list_mut(entity.kind).push(entity);
    }

    pub fn entities(&self, kind: GraphEntityKind) -> &[GraphEntity] {
        match kind {
            GraphEntityKind::Event => &self.events,
            GraphEntityKind::Foreshadow => &self.foreshadows,
            GraphEntityKind::Plotline => &self.plotlines,
            GraphEntityKind::ConflictArc => &self.conflict_arcs,
            GraphEntityKind::CharacterArc => &self.character_arcs,
            GraphEntityKind::CharacterProfile => &self.character_profiles,
        }
    }

    fn list_mut(&mut self, kind: GraphEntityKind) -> &mut Vec<GraphEntity> {
        match kind {
            GraphEntityKind::Event => &mut self.events,
            GraphEntityKind::Foreshadow => &mut self.foreshadows,
            GraphEntityKind::Plotline => &mut self.plotlines,
            GraphEntityKind::ConflictArc => &mut self.conflict_arcs,
            GraphEntityKind::CharacterArc => &mut self.character_arcs,
            GraphEntityKind::CharacterProfile => &mut self.character_profiles,
        }
    }

    pub fn with_entities(mut self, entities: impl IntoIterator<Item = GraphEntity>) -> Self {
        for entity in entities {
            self.push_entity(entity);
        }
        self
    }

    pub fn with_recent_chapters(mut self, chapters: Vec<ChapterText>) -> Self {
        self.recent_chapters = chapters;
        self
    }

    pub fn with_summaries(mut self, summaries: Vec<ChapterSummary>) -> Self {
        self.summaries = summaries;
        self
    }
}

/// Read candidates for `chapter` from the store.
///
/// Store reads never fail the call: a kind that cannot be read is logged and
/// left empty. Recent chapter texts and summaries come from the caller.
pub async fn load_candidates(
    store: &dyn EntityStore,
    novel_id: NovelId,
    chapter: ChapterNumber,
    policy: &BudgetPolicy,
) -> ContextCandidates {
    let mut candidates = ContextCandidates::new();
    let limit = policy.candidate_fetch_limit;

    for kind in GraphEntityKind::ALL {
        match store.get_graph_entities(novel_id, kind, chapter, limit).await {
            Ok(entities) => *candidates.list_mut(kind) = entities,
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, kind = %kind, error = %e, "graph candidates unavailable")
            }
        }
    }

    match store.get_character_states(novel_id, limit).await {
        Ok(characters) => candidates.characters = characters,
        Err(e) => warn!(novel_id = %novel_id, chapter, error = %e, "character candidates unavailable"),
    }
    match store.get_top_relationships(novel_id, limit).await {
        Ok(relationships) => candidates.relationships = relationships,
        Err(e) => warn!(novel_id = %novel_id, chapter, error = %e, "relationship candidates unavailable"),
    }
    match store.get_open_quests(novel_id, chapter).await {
        Ok(quests) => candidates.open_quests = quests,
        Err(e) => warn!(novel_id = %novel_id, chapter, error = %e, "open quests unavailable"),
    }

    debug!(
        novel_id = %novel_id,
        chapter,
        graph = candidates.graph_count(),
        characters = candidates.characters.len(),
        quests = candidates.open_quests.len(),
        "candidates loaded"
    );
    candidates
}
