//! Chronicle Test Utilities
//!
//! Shared test infrastructure for the chronicle workspace:
//! - Proptest generators for graph entities, importance properties and volume layouts
//! - A scripted text generator standing in for a real provider
//! - Fixtures for common scenarios
//! - Assertions for chronicle error variants and budget invariants

// Re-export mock storage from its source crate
pub use chronicle_storage::MockEntityStore;

pub use chronicle_core::{
    ChapterNumber, ChapterSummary, ChapterText, CharacterState, CharacterUpdate, ChronicleConfig,
    ChronicleError, ChronicleResult, ConfigError, EntityType, ExtractionError, GraphEntity,
    GraphEntityKind, LlmError, NovelId, OpenQuest, PlanningSettings, RelationshipState,
    StorageError, VolumeRecord,
};

use async_trait::async_trait;
use chronicle_llm::{GenerationConfig, TextGenerator};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// SCRIPTED GENERATOR
// ============================================================================

/// Text generator that replays queued responses.
///
/// Queued entries are consumed in order; once the queue is empty every call
/// gets the fallback. Prompts are recorded for inspection.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    queue: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    fallback: Result<String, LlmError>,
    prompts: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    const PROVIDER: &'static str = "scripted";

    fn with_fallback(fallback: Result<String, LlmError>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            prompts: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Always reply with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_fallback(Ok(text.into()))
    }

    /// Always fail with a request error.
    pub fn failing() -> Self {
        Self::with_fallback(Err(LlmError::RequestFailed {
            provider: Self::PROVIDER.to_string(),
            status: 503,
            message: "scripted failure".to_string(),
        }))
    }

    /// Queue one response ahead of the fallback.
    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(text.into()));
        self
    }

    /// Queue one error ahead of the fallback.
    pub fn then_fail(self, error: LlmError) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> ChronicleResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
            .map_err(ChronicleError::from)
    }

    fn provider_name(&self) -> &str {
        Self::PROVIDER
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for chronicle inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    pub fn arb_novel_id() -> impl Strategy<Value = NovelId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_chapter() -> impl Strategy<Value = ChapterNumber> {
        1u32..=2_000
    }

    pub fn arb_graph_entity_kind() -> impl Strategy<Value = GraphEntityKind> {
        prop::sample::select(GraphEntityKind::ALL.to_vec())
    }

    /// A property bag exercising one link of the importance fallback chain.
    pub fn arb_importance_props() -> impl Strategy<Value = BTreeMap<String, Value>> {
        let label = prop::sample::select(vec![
            "high", "critical", "核心", "medium", "mid", "low", "次要", "unknown",
        ]);
        prop_oneof![
            (0.0f64..=1.0).prop_map(|v| single("importance_score", json!(v))),
            (0.0f64..=1.0).prop_map(|v| single("importanceScore", json!(v))),
            (0.0f64..=1.0).prop_map(|v| single("importance", json!(v))),
            label.prop_map(|l| single("importance", json!(l))),
            (0.0f64..=1.0).prop_map(|v| single("priority", json!(v))),
            (0.0f64..=1.0).prop_map(|v| single("urgency", json!(v))),
            Just(BTreeMap::new()),
        ]
    }

    fn single(key: &str, value: Value) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert(key.to_string(), value);
        map
    }

    pub fn arb_graph_entity(kind: GraphEntityKind) -> impl Strategy<Value = GraphEntity> {
        (
            "[a-z]{4,10}",
            1u32..=300,
            arb_importance_props(),
            prop::option::of(-2.0f64..=20.0),
            "[A-Za-z ]{0,300}",
        )
            .prop_map(move |(id, chapter, props, relevance, description)| {
                let mut entity = GraphEntity::new(format!("{}-{}", kind, id), kind, chapter)
                    .with_property("name", json!(id))
                    .with_property("description", json!(description));
                entity.properties.extend(props);
                entity.relevance_score = relevance;
                entity
            })
    }

    pub fn arb_graph_entity_any() -> impl Strategy<Value = GraphEntity> {
        arb_graph_entity_kind().prop_flat_map(arb_graph_entity)
    }

    /// Contiguous persisted volumes plus matching settings.
    pub fn arb_volume_layout() -> impl Strategy<Value = (Vec<VolumeRecord>, PlanningSettings)> {
        (1u32..=8, 20u32..=200).prop_map(|(count, per_volume)| {
            let volumes = (0..count)
                .map(|i| VolumeRecord::new(i + 1, i * per_volume + 1, (i + 1) * per_volume))
                .collect();
            (volumes, PlanningSettings::new(count, count * per_volume))
        })
    }

    /// Quest names with assorted prefixes and separators.
    pub fn arb_quest_name() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["", "Q-", "q_", "Q_ ", " - "]),
            prop::collection::vec("[A-Za-z]{1,8}", 1..4),
            prop::sample::select(vec![" ", "-", "  ", "_"]),
        )
            .prop_map(|(prefix, words, sep)| format!("{}{}", prefix, words.join(sep)))
    }

    pub fn arb_valid_config() -> impl Strategy<Value = ChronicleConfig> {
        (1usize..=5, 0.05f64..=0.9, 1usize..=20, 1u32..=10).prop_map(
            |(key_characters, min_importance, max_events, volume_count)| {
                let mut config = ChronicleConfig::default_policies();
                config.extraction.max_key_characters = key_characters;
                config.budget.min_importance = min_importance;
                config.budget.max_events = max_events;
                config.planner.default_volume_count = volume_count;
                config
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde_json::json;

    /// Fenced extraction response: protagonist with inventory, one hostile
    /// and one allied key character, one progressing and one stalled quest.
    pub const EXTRACTION_RESPONSE: &str = r#"Here is the extraction:
```json
{
  "protagonist": {"name": "Lin Feng", "location": "Azure Peak", "realm": "Foundation",
                  "alive": true, "status": "wounded", "inventory": ["Jade Sword"]},
  "key_characters": [
    {"name": "Su Yan", "location": "Azure Peak", "relation": "sworn enemy"},
    {"name": "Elder Mo", "realm": "Core Formation", "relation": "ally"}
  ],
  "quest_progress": {"Q-Find the Sword": "found a clue", "Rescue the Elder": "stalled"}
}
```"#;

    /// Response that resolves the sword quest.
    pub const RESOLUTION_RESPONSE: &str =
        r#"{"protagonist": {"name": "Lin Feng"}, "quest_progress": {"find the sword": "completed"}}"#;

    /// Truncated mid-object.
    pub const BROKEN_RESPONSE: &str = r#"```json
{"protagonist": {"name": "Lin Feng", "inventory": ["#;

    pub fn minimal_config() -> ChronicleConfig {
        ChronicleConfig::default_policies()
    }

    pub fn novel_id() -> NovelId {
        chronicle_core::new_novel_id()
    }

    pub fn character(novel_id: NovelId, name: &str, chapter: ChapterNumber) -> CharacterState {
        CharacterState::new(novel_id, name, chapter)
    }

    /// Named graph entity with a description.
    pub fn graph_entity(kind: GraphEntityKind, id: &str, chapter: ChapterNumber) -> GraphEntity {
        GraphEntity::new(id, kind, chapter)
            .with_property("name", json!(id))
            .with_property("description", json!(format!("{} happened", id)))
    }

    /// Entity carrying an explicit numeric importance score.
    pub fn scored_entity(
        kind: GraphEntityKind,
        id: &str,
        chapter: ChapterNumber,
        importance: f64,
    ) -> GraphEntity {
        graph_entity(kind, id, chapter).with_property("importance_score", json!(importance))
    }

    /// `count` events with importance spread evenly across [0, 1].
    pub fn scored_events(count: usize, chapter: ChapterNumber) -> Vec<GraphEntity> {
        let denominator = count.saturating_sub(1).max(1) as f64;
        (0..count)
            .map(|i| {
                scored_entity(
                    GraphEntityKind::Event,
                    &format!("event-{:02}", i),
                    chapter.saturating_sub((i % chapter.max(1) as usize) as u32).max(1),
                    i as f64 / denominator,
                )
            })
            .collect()
    }

    /// Five persisted 100-chapter volumes.
    pub fn five_volumes() -> Vec<VolumeRecord> {
        (0..5)
            .map(|i| VolumeRecord::new(i + 1, i * 100 + 1, (i + 1) * 100))
            .collect()
    }

    pub fn five_by_five_hundred() -> PlanningSettings {
        PlanningSettings::new(5, 500)
    }

    pub fn chapter_text(chapter: ChapterNumber, content: &str) -> ChapterText {
        ChapterText {
            chapter_number: chapter,
            title: format!("Chapter {}", chapter),
            content: content.to_string(),
        }
    }

    pub fn summaries(chapters: std::ops::RangeInclusive<ChapterNumber>) -> Vec<ChapterSummary> {
        chapters
            .map(|chapter| ChapterSummary {
                chapter_number: chapter,
                summary: format!("Summary of chapter {}.", chapter),
            })
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for chronicle-specific validation.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ChronicleResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &ChronicleResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &ChronicleResult<T>) {
        match result {
            Err(ChronicleError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a ChronicleResult is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ChronicleResult<T>, entity_type: EntityType) {
        match result {
            Err(ChronicleError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &ChronicleResult<T>) {
        match result {
            Err(ChronicleError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_llm_error<T: std::fmt::Debug>(result: &ChronicleResult<T>) {
        match result {
            Err(ChronicleError::Llm(_)) => {}
            other => panic!("Expected LLM error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_valid(config: &ChronicleConfig) {
        if let Err(e) = config.validate() {
            panic!("Expected valid config, got: {:?}", e);
        }
    }

    /// Assert that scores never increase.
    #[track_caller]
    pub fn assert_sorted_desc(scores: &[f64]) {
        for pair in scores.windows(2) {
            assert!(
                pair[0] >= pair[1],
                "Scores not in descending order: {} before {}",
                pair[0],
                pair[1]
            );
        }
    }

    /// Assert that every score clears the threshold.
    #[track_caller]
    pub fn assert_all_at_least(scores: &[f64], threshold: f64) {
        for score in scores {
            assert!(*score >= threshold, "Score {} below threshold {}", score, threshold);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
