//! Budgeted context assembly.

use crate::candidates::{load_candidates, ContextCandidates};
use crate::digest::{build_digest, ContextDigest, DigestInput};
use crate::filter::{
    cap_recent_chapters, cap_summaries, filter_category, rank_unfiltered, top_ranked,
    truncate_event_text, RankedEntity,
};
use chronicle_core::{
    BudgetPolicy, ChapterNumber, ChapterSummary, ChapterText, CharacterState, NovelId, OpenQuest,
    RelationshipState,
};
use chronicle_storage::EntityStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Filtered candidate lists plus the digest, ready for prompt construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedContext {
    pub novel_id: NovelId,
    pub chapter: ChapterNumber,
    /// Filtering was skipped and the lists are the raw candidates
    pub bypassed: bool,
    pub events: Vec<RankedEntity>,
    pub foreshadows: Vec<RankedEntity>,
    pub plotlines: Vec<RankedEntity>,
    pub conflict_arcs: Vec<RankedEntity>,
    pub character_arcs: Vec<RankedEntity>,
    pub character_profiles: Vec<RankedEntity>,
    pub characters: Vec<CharacterState>,
    pub relationships: Vec<RelationshipState>,
    pub open_quests: Vec<OpenQuest>,
    pub recent_chapters: Vec<ChapterText>,
    pub summaries: Vec<ChapterSummary>,
    /// `None` when bypassed
    pub digest: Option<ContextDigest>,
}

impl OptimizedContext {
    /// Total graph entities kept across all categories.
    pub fn entity_count(&self) -> usize {
        self.events.len()
            + self.foreshadows.len()
            + self.plotlines.len()
            + self.conflict_arcs.len()
            + self.character_arcs.len()
            + self.character_profiles.len()
    }
}

/// Selects what fits the budget. Holds no state besides its policy, so one
/// instance can serve any number of novels concurrently.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    policy: BudgetPolicy,
}

impl ContextAssembler {
    pub fn new(policy: BudgetPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BudgetPolicy {
        &self.policy
    }

    /// Early chapters and sparse graphs skip filtering entirely.
    pub fn should_bypass(&self, chapter: ChapterNumber, candidates: &ContextCandidates) -> bool {
        chapter <= self.policy.bypass_through_chapter
            || candidates.graph_count() < self.policy.bypass_min_candidates
    }

    /// Filter `candidates` for `chapter`. Pure: no store access.
    pub fn assemble(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        candidates: ContextCandidates,
    ) -> OptimizedContext {
        if self.should_bypass(chapter, &candidates) {
            debug!(
                novel_id = %novel_id,
                chapter,
                graph = candidates.graph_count(),
                "context filtering bypassed"
            );
            return Self::passthrough(novel_id, chapter, candidates);
        }

        let p = &self.policy;
        let before = candidates.graph_count();

        let mut events = filter_category(candidates.events, p.max_events, p.min_importance);
        for ranked in &mut events {
            truncate_event_text(&mut ranked.entity, p.max_event_description_chars);
        }
        let foreshadows = filter_category(candidates.foreshadows, p.max_foreshadows, p.min_importance);
        let plotlines = filter_category(candidates.plotlines, p.max_plotlines, p.min_importance);
        let conflict_arcs =
            filter_category(candidates.conflict_arcs, p.max_conflict_arcs, p.min_importance);
        let character_arcs =
            filter_category(candidates.character_arcs, p.max_character_arcs, p.min_importance);
        let character_profiles = top_ranked(candidates.character_profiles, p.max_characters);

        let mut characters = candidates.characters;
        characters.sort_by(|a, b| {
            b.last_seen_chapter
                .cmp(&a.last_seen_chapter)
                .then_with(|| a.name.cmp(&b.name))
        });
        characters.truncate(p.max_characters);

        let mut relationships = candidates.relationships;
        relationships.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.last_updated_chapter.cmp(&a.last_updated_chapter))
        });
        relationships.truncate(p.max_relationships);

        let mut open_quests = candidates.open_quests;
        open_quests.sort_by(|a, b| a.due_chapter.cmp(&b.due_chapter).then_with(|| a.id.cmp(&b.id)));

        let recent_chapters = cap_recent_chapters(
            candidates.recent_chapters,
            p.max_recent_chapters,
            p.max_recent_chapter_chars,
        );
        let summaries = cap_summaries(candidates.summaries, p.max_summaries);

        let digest = build_digest(
            &DigestInput {
                chapter,
                events: &events,
                foreshadows: &foreshadows,
                plotlines: &plotlines,
                conflict_arcs: &conflict_arcs,
                character_arcs: &character_arcs,
                open_quests: &open_quests,
            },
            p,
        );

        let context = OptimizedContext {
            novel_id,
            chapter,
            bypassed: false,
            events,
            foreshadows,
            plotlines,
            conflict_arcs,
            character_arcs,
            character_profiles,
            characters,
            relationships,
            open_quests,
            recent_chapters,
            summaries,
            digest: Some(digest),
        };
        debug!(
            novel_id = %novel_id,
            chapter,
            before,
            kept = context.entity_count(),
            "context filtered"
        );
        context
    }

    /// Load candidates from the store, then assemble. Recent chapter texts
    /// and summaries are supplied by the caller.
    pub async fn assemble_from_store(
        &self,
        store: &dyn EntityStore,
        novel_id: NovelId,
        chapter: ChapterNumber,
        recent_chapters: Vec<ChapterText>,
        summaries: Vec<ChapterSummary>,
    ) -> OptimizedContext {
        let candidates = load_candidates(store, novel_id, chapter, &self.policy)
            .await
            .with_recent_chapters(recent_chapters)
            .with_summaries(summaries);
        self.assemble(novel_id, chapter, candidates)
    }

    fn passthrough(
        novel_id: NovelId,
        chapter: ChapterNumber,
        candidates: ContextCandidates,
    ) -> OptimizedContext {
        OptimizedContext {
            novel_id,
            chapter,
            bypassed: true,
            events: rank_unfiltered(candidates.events),
            foreshadows: rank_unfiltered(candidates.foreshadows),
            plotlines: rank_unfiltered(candidates.plotlines),
            conflict_arcs: rank_unfiltered(candidates.conflict_arcs),
            character_arcs: rank_unfiltered(candidates.character_arcs),
            character_profiles: rank_unfiltered(candidates.character_profiles),
            characters: candidates.characters,
            relationships: candidates.relationships,
            open_quests: candidates.open_quests,
            recent_chapters: candidates.recent_chapters,
            summaries: candidates.summaries,
            digest: None,
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(BudgetPolicy::default())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chronicle_core::{new_novel_id, GraphEntityKind};
    use chronicle_test_utils::generators::arb_graph_entity;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Past the bypass window every category respects its cap and threshold.
        #[test]
        fn prop_assembly_respects_caps(
            events in prop::collection::vec(arb_graph_entity(GraphEntityKind::Event), 0..30),
            arcs in prop::collection::vec(arb_graph_entity(GraphEntityKind::ConflictArc), 0..10),
            chapter in 6u32..500,
        ) {
            let assembler = ContextAssembler::default();
            let policy = assembler.policy().clone();
            let candidates = ContextCandidates::new().with_entities(events).with_entities(arcs);
            let bypass = assembler.should_bypass(chapter, &candidates);
            let total = candidates.graph_count();

            let context = assembler.assemble(new_novel_id(), chapter, candidates);

            if bypass {
                prop_assert_eq!(context.events.len() + context.conflict_arcs.len(), total);
            } else {
                prop_assert!(context.events.len() <= policy.max_events);
                prop_assert!(context.conflict_arcs.len() <= policy.max_conflict_arcs);
                for r in context.events.iter().chain(context.conflict_arcs.iter()) {
                    prop_assert!(r.importance >= policy.min_importance);
                }
            }
        }
    }
}
