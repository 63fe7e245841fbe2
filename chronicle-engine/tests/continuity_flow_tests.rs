//! End-to-end flows across extraction, assembly and planning.

use chronicle_core::{ChronicleConfig, EntityType, GraphEntityKind, VolumeRecord};
use chronicle_engine::ContinuityEngine;
use chronicle_extract::MergeStatus;
use chronicle_planner::{SelectionSource, VolumeLookup};
use chronicle_storage::EntityStore;
use chronicle_test_utils::{fixtures, MockEntityStore, ScriptedGenerator};
use std::sync::Arc;
use std::time::Duration;

fn engine_with(store: &MockEntityStore, generator: ScriptedGenerator) -> ContinuityEngine {
    ContinuityEngine::with_store(
        Arc::new(store.clone()),
        Arc::new(generator),
        ChronicleConfig::default_policies(),
    )
    .expect("valid default config")
}

async fn seed_graph(store: &MockEntityStore, novel: chronicle_core::NovelId) {
    for event in fixtures::scored_events(12, 12) {
        store.insert_graph_entity(novel, &event).await.unwrap();
    }
    store
        .insert_graph_entity(
            novel,
            &fixtures::scored_entity(GraphEntityKind::ConflictArc, "sect war", 10, 0.9),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_extracted_state_reaches_next_chapter_context() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE));
    seed_graph(&store, novel).await;

    let report = engine.extract_and_merge(novel, 12, "The Pass", "chapter text").await;
    assert_eq!(report.status, MergeStatus::Applied);

    let context = engine
        .assemble_context(novel, 13, vec![fixtures::chapter_text(12, "Lin Feng climbed.")], Vec::new())
        .await;

    assert!(!context.bypassed);
    let names: Vec<&str> = context.characters.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"Lin Feng"));
    assert_eq!(context.relationships.len(), 2);
    assert_eq!(context.open_quests.len(), 2);
    assert_eq!(context.open_quests[0].due_chapter, 17);
    assert_eq!(context.digest.as_ref().unwrap().primary_conflict_name.as_deref(), Some("sect war"));
}

#[tokio::test]
async fn test_overdue_quests_surface_as_alerts() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE));
    seed_graph(&store, novel).await;

    engine.extract_and_merge(novel, 12, "The Pass", "chapter text").await;
    let context = engine.assemble_context(novel, 30, Vec::new(), Vec::new()).await;

    let alerts = &context.digest.unwrap().quest_alerts;
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].ends_with("overdue since chapter 17"));
    assert!(alerts[1].ends_with("overdue since chapter 22"));
}

#[tokio::test]
async fn test_generation_failure_changes_nothing_and_flow_continues() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let engine = engine_with(&store, ScriptedGenerator::failing());

    let report = engine.extract_and_merge(novel, 4, "Quiet", "text").await;

    assert_eq!(report.status, MergeStatus::GenerationFailed);
    assert_eq!(store.mutation_count(), 0);
    let context = engine.assemble_context(novel, 5, Vec::new(), Vec::new()).await;
    assert!(context.bypassed);
    assert!(context.characters.is_empty());
}

#[tokio::test]
async fn test_malformed_output_changes_nothing() {
    let store = MockEntityStore::new();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::BROKEN_RESPONSE));

    let report = engine
        .extract_and_merge(fixtures::novel_id(), 4, "Quiet", "text")
        .await;

    assert_eq!(report.status, MergeStatus::Malformed);
    assert_eq!(store.mutation_count(), 0);
}

#[tokio::test]
async fn test_write_failures_stay_isolated() {
    let store = MockEntityStore::new();
    store.inject_write_failure(EntityType::Relationship).unwrap();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE));

    let report = engine
        .extract_and_merge(fixtures::novel_id(), 12, "The Pass", "text")
        .await;

    assert_eq!(report.status, MergeStatus::Applied);
    assert_eq!(report.relationships_upserted, 0);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.characters_upserted, 3);
    assert_eq!(report.quests_opened, 2);
}

#[tokio::test]
async fn test_background_extraction_does_not_block_caller() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let generator = ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE)
        .with_delay(Duration::from_millis(50));
    let engine = engine_with(&store, generator);

    let handle = engine.spawn_extraction(novel, 12, "The Pass".to_string(), "text".to_string());
    assert!(!handle.is_finished());

    let report = handle.await.unwrap();
    assert_eq!(report.status, MergeStatus::Applied);
    assert!(store.get_character_state(novel, "Lin Feng").await.unwrap().is_some());
}

#[tokio::test]
async fn test_extraction_waits_for_novel_lock() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE));

    let lock = engine.novel_lock(novel);
    let guard = lock.lock().await;
    let handle = engine.spawn_extraction(novel, 12, "The Pass".to_string(), "text".to_string());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_finished());
    assert_eq!(store.mutation_count(), 0);

    drop(guard);
    let report = handle.await.unwrap();
    assert_eq!(report.status, MergeStatus::Applied);
    assert!(store.mutation_count() > 0);
}

#[tokio::test]
async fn test_other_novels_are_not_blocked() {
    let store = MockEntityStore::new();
    let engine = engine_with(&store, ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE));

    let locked = fixtures::novel_id();
    let lock = engine.novel_lock(locked);
    let _guard = lock.lock().await;

    let free = fixtures::novel_id();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine.extract_and_merge(free, 12, "The Pass", "text"),
    )
    .await
    .expect("unrelated novel must not wait");
    assert_eq!(report.status, MergeStatus::Applied);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_passes_for_one_novel_all_apply() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    let generator = ScriptedGenerator::replying(fixtures::EXTRACTION_RESPONSE)
        .with_delay(Duration::from_millis(5));
    let engine = engine_with(&store, generator.clone());

    let handles: Vec<_> = (10..15)
        .map(|chapter| engine.spawn_extraction(novel, chapter, format!("Chapter {}", chapter), "text".to_string()))
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, MergeStatus::Applied);
    }

    assert_eq!(generator.calls(), 5);
    let lin = store.get_character_state(novel, "Lin Feng").await.unwrap().unwrap();
    assert!((10..15).contains(&lin.first_seen_chapter));
    assert_eq!(engine.tracked_novels(), 1);
}

#[tokio::test]
async fn test_volume_selection_scenarios() {
    let store = MockEntityStore::new();
    let engine = engine_with(&store, ScriptedGenerator::failing());

    let planned = fixtures::novel_id();
    store.set_volumes(planned, fixtures::five_volumes()).unwrap();
    store
        .set_planning_settings(planned, fixtures::five_by_five_hundred())
        .unwrap();
    let second = engine.select_volume(planned, 101).await.into_selection().unwrap();
    assert_eq!(second.volume_number, 2);
    assert!((second.progress_percent - 1.0).abs() < 1e-9);

    let partial = fixtures::novel_id();
    store.set_volumes(partial, vec![VolumeRecord::new(1, 1, 100)]).unwrap();
    store
        .set_planning_settings(partial, fixtures::five_by_five_hundred())
        .unwrap();
    let overrun = engine.select_volume(partial, 110).await.into_selection().unwrap();
    assert_eq!(overrun.volume_number, 1);
    assert!(overrun.overrun);
    assert_eq!(overrun.source, SelectionSource::ExtendedPastEnd);
    let next = engine.select_volume(partial, 111).await.into_selection().unwrap();
    assert_eq!(next.volume_number, 2);
    assert!(next.fallback);

    let settings_only = fixtures::novel_id();
    store
        .set_planning_settings(settings_only, fixtures::five_by_five_hundred())
        .unwrap();
    assert!(engine.select_volume(settings_only, 250).await.into_selection().unwrap().fallback);

    assert_eq!(
        engine.select_volume(fixtures::novel_id(), 250).await,
        VolumeLookup::NotFound
    );
}

#[tokio::test]
async fn test_prepare_chapter_bundles_everything() {
    let store = MockEntityStore::new();
    let novel = fixtures::novel_id();
    store.set_volumes(novel, fixtures::five_volumes()).unwrap();
    seed_graph(&store, novel).await;
    let engine = engine_with(&store, ScriptedGenerator::failing());

    let prepared = engine
        .prepare_chapter(
            novel,
            29,
            vec![fixtures::chapter_text(28, "The gate opened.")],
            fixtures::summaries(20..=27),
        )
        .await;

    assert_eq!(prepared.volume.selection().unwrap().volume_number, 1);
    assert!(!prepared.context.bypassed);
    assert!(prepared.window.used_tokens <= prepared.window.max_tokens);
    assert!(prepared.window.to_string().contains("sect war"));
}
