//! State extraction and merge engine.

use crate::conflict::detect_conflicts;
use crate::payload::{parse_extraction, CharacterRecord, ExtractionRecord, QuestProgress};
use crate::prompt::{build_extraction_prompt, PromptInput, EXTRACTION_SYSTEM_PROMPT};
use crate::quest::{classify_progress, due_chapter, QuestSignal};
use crate::relation::relation_strength;
use crate::report::MergeReport;
use chronicle_core::{
    canonical_character_name, normalize_quest_id, ChapterNumber, CharacterUpdate,
    ExtractionPolicy, NovelId, OpenQuest, RelationshipState,
};
use chronicle_llm::{GenerationConfig, TextGenerator};
use chronicle_storage::{EntityStore, QuestUpsert};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns chapter text into structured facts and merges them into the store.
///
/// Every public method is best-effort: failures end up in the returned
/// [`MergeReport`], never in an `Err`.
pub struct StateExtractor {
    store: Arc<dyn EntityStore>,
    generator: Arc<dyn TextGenerator>,
    policy: ExtractionPolicy,
}

impl StateExtractor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        generator: Arc<dyn TextGenerator>,
        policy: ExtractionPolicy,
    ) -> Self {
        Self {
            store,
            generator,
            policy,
        }
    }

    pub fn policy(&self) -> &ExtractionPolicy {
        &self.policy
    }

    /// Build the extraction prompt with the current roster and open quests.
    /// Store read failures degrade to an empty roster.
    pub async fn build_prompt(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        title: &str,
        text: &str,
    ) -> String {
        let roster: Vec<String> = match self
            .store
            .get_character_states(novel_id, self.policy.roster_limit)
            .await
        {
            Ok(states) => states.into_iter().map(|s| s.name).collect(),
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, error = %e, "roster unavailable for extraction prompt");
                Vec::new()
            }
        };
        let open_quests = match self.store.get_open_quests(novel_id, chapter).await {
            Ok(quests) => quests,
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, error = %e, "open quests unavailable for extraction prompt");
                Vec::new()
            }
        };

        build_extraction_prompt(
            &PromptInput {
                chapter_number: chapter,
                chapter_title: title,
                chapter_text: text,
                roster: &roster,
                open_quests: &open_quests,
            },
            &self.policy,
        )
    }

    /// Generate, parse and merge facts for one chapter.
    pub async fn extract_and_merge(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        title: &str,
        text: &str,
    ) -> MergeReport {
        let prompt = self.build_prompt(novel_id, chapter, title, text).await;
        let config = GenerationConfig::structured(EXTRACTION_SYSTEM_PROMPT);

        let generated = match self.generator.generate(&prompt, &config).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!(
                    novel_id = %novel_id,
                    chapter,
                    provider = self.generator.provider_name(),
                    error = %e,
                    "extraction generation failed; chapter skipped"
                );
                return MergeReport::generation_failed(novel_id, chapter, e.to_string());
            }
        };

        let record = match parse_extraction(&generated) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    novel_id = %novel_id,
                    chapter,
                    error = %e,
                    response_chars = generated.len(),
                    "extraction payload unusable; chapter skipped"
                );
                return MergeReport::malformed(novel_id, chapter, e.to_string());
            }
        };

        self.merge_record(novel_id, chapter, &record).await
    }

    /// Merge an already-parsed record. Each write is attempted independently.
    pub async fn merge_record(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        record: &ExtractionRecord,
    ) -> MergeReport {
        let mut report = MergeReport::applied(novel_id, chapter);

        let protagonist = record
            .protagonist
            .as_ref()
            .and_then(|p| canonical_character_name(&p.name));

        match (&record.protagonist, &protagonist) {
            (Some(p), Some(name)) => self.merge_character(novel_id, chapter, name, p, &mut report).await,
            (Some(_), None) => report.skipped += 1,
            _ => {}
        }

        let dropped = record
            .key_characters
            .len()
            .saturating_sub(self.policy.max_key_characters);
        if dropped > 0 {
            debug!(novel_id = %novel_id, chapter, dropped, "key characters beyond cap ignored");
        }

        for character in record.key_characters.iter().take(self.policy.max_key_characters) {
            let Some(name) = canonical_character_name(&character.name) else {
                report.skipped += 1;
                continue;
            };
            self.merge_character(novel_id, chapter, &name, character, &mut report)
                .await;

            if let (Some(relation), Some(protagonist)) = (&character.relation, &protagonist) {
                if protagonist != &name {
                    self.merge_relationship(novel_id, chapter, protagonist, &name, relation, &mut report)
                        .await;
                }
            }
        }

        for progress in &record.quest_progress {
            self.merge_quest(novel_id, chapter, progress, &mut report).await;
        }

        for warning in &report.warnings {
            warn!(novel_id = %novel_id, chapter, warning = %warning, "continuity conflict");
        }
        info!(
            novel_id = %novel_id,
            chapter,
            writes = report.writes(),
            warnings = report.warnings.len(),
            failures = report.failures.len(),
            skipped = report.skipped,
            "merge pass applied"
        );
        report
    }

    async fn merge_character(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        name: &str,
        record: &CharacterRecord,
        report: &mut MergeReport,
    ) {
        let stored = match self.store.get_character_state(novel_id, name).await {
            Ok(stored) => stored,
            Err(e) => {
                report
                    .failures
                    .push(format!("character '{}' lookup: {}", name, e));
                None
            }
        };
        report
            .warnings
            .extend(detect_conflicts(stored.as_ref(), record, chapter));

        let update = CharacterUpdate {
            name: name.to_string(),
            location: record.location.clone(),
            realm: record.realm.clone(),
            alive: record.alive,
            status: record.status.clone(),
            chapter,
        };
        if let Err(e) = self.store.upsert_character_state(novel_id, &update).await {
            warn!(novel_id = %novel_id, chapter, character = name, error = %e, "character upsert failed");
            report.failures.push(format!("character '{}': {}", name, e));
            return;
        }
        report.characters_upserted += 1;

        if let Some(items) = &record.inventory {
            match self
                .store
                .update_character_inventory(novel_id, name, items, chapter)
                .await
            {
                Ok(()) => report.inventories_updated += 1,
                Err(e) => {
                    warn!(novel_id = %novel_id, chapter, character = name, error = %e, "inventory update failed");
                    report
                        .failures
                        .push(format!("inventory '{}': {}", name, e));
                }
            }
        }
    }

    async fn merge_relationship(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        protagonist: &str,
        other: &str,
        relation: &str,
        report: &mut MergeReport,
    ) {
        let strength = relation_strength(relation, self.policy.default_relation_strength);
        let relationship =
            RelationshipState::new(novel_id, protagonist, other, relation.trim(), strength, chapter);

        match self.store.upsert_relationship(&relationship).await {
            Ok(()) => report.relationships_upserted += 1,
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, a = protagonist, b = other, error = %e, "relationship upsert failed");
                report
                    .failures
                    .push(format!("relationship '{}'/'{}': {}", protagonist, other, e));
            }
        }
    }

    async fn merge_quest(
        &self,
        novel_id: NovelId,
        chapter: ChapterNumber,
        progress: &QuestProgress,
        report: &mut MergeReport,
    ) {
        let Some(quest_id) = normalize_quest_id(&progress.name) else {
            report.skipped += 1;
            return;
        };

        let signal = classify_progress(&progress.progress);
        if signal == QuestSignal::Resolved {
            match self.store.resolve_open_quest(novel_id, &quest_id, chapter).await {
                Ok(true) => report.quests_resolved += 1,
                Ok(false) => {
                    debug!(novel_id = %novel_id, chapter, quest = %quest_id, "quest already resolved or untracked")
                }
                Err(e) => {
                    warn!(novel_id = %novel_id, chapter, quest = %quest_id, error = %e, "quest resolution failed");
                    report.failures.push(format!("quest '{}': {}", quest_id, e));
                }
            }
            return;
        }

        let mut quest = OpenQuest::open(
            novel_id,
            quest_id.clone(),
            progress.name.clone(),
            chapter,
            due_chapter(chapter, signal, &self.policy),
        );
        if !progress.progress.is_empty() {
            quest = quest.with_progress(progress.progress.clone());
        }

        match self.store.upsert_open_quest(&quest).await {
            Ok(QuestUpsert::Created) => report.quests_opened += 1,
            Ok(QuestUpsert::Updated) => report.quests_progressed += 1,
            Ok(QuestUpsert::AlreadyResolved) => {
                debug!(novel_id = %novel_id, chapter, quest = %quest_id, "resolved quest not reopened")
            }
            Err(e) => {
                warn!(novel_id = %novel_id, chapter, quest = %quest_id, error = %e, "quest upsert failed");
                report.failures.push(format!("quest '{}': {}", quest_id, e));
            }
        }
    }
}

impl std::fmt::Debug for StateExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateExtractor")
            .field("generator", &self.generator.provider_name())
            .field("policy", &self.policy)
            .finish()
    }
}
