//! Per-category ranking, thresholding and truncation.

use crate::importance::{resolve_importance, ImportanceSource};
use chronicle_core::{truncate_chars, ChapterSummary, ChapterText, GraphEntity};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A graph entity with its resolved importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub entity: GraphEntity,
    pub importance: f64,
    pub source: ImportanceSource,
}

impl RankedEntity {
    pub fn new(entity: GraphEntity) -> Self {
        let resolved = resolve_importance(&entity);
        Self {
            entity,
            importance: resolved.score,
            source: resolved.source,
        }
    }
}

/// Score without reordering or dropping anything.
pub fn rank_unfiltered(entities: Vec<GraphEntity>) -> Vec<RankedEntity> {
    entities.into_iter().map(RankedEntity::new).collect()
}

fn by_importance_desc(a: &RankedEntity, b: &RankedEntity) -> Ordering {
    b.importance
        .partial_cmp(&a.importance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entity.chapter_number.cmp(&a.entity.chapter_number))
        .then_with(|| a.entity.id.cmp(&b.entity.id))
}

/// Sort by importance descending, drop entities below `min_importance`, keep
/// at most `cap`. Ties go to the more recent chapter, then to the lower id.
pub fn filter_category(
    entities: Vec<GraphEntity>,
    cap: usize,
    min_importance: f64,
) -> Vec<RankedEntity> {
    let mut ranked: Vec<RankedEntity> = entities
        .into_iter()
        .map(RankedEntity::new)
        .filter(|r| r.importance >= min_importance)
        .collect();
    ranked.sort_by(by_importance_desc);
    ranked.truncate(cap);
    ranked
}

/// Sort and cap without a threshold.
pub fn top_ranked(entities: Vec<GraphEntity>, cap: usize) -> Vec<RankedEntity> {
    filter_category(entities, cap, f64::NEG_INFINITY)
}

const EVENT_TEXT_KEYS: [&str; 3] = ["description", "summary", "content"];

/// Shorten an event's free-text fields in place. Other properties are kept.
pub fn truncate_event_text(entity: &mut GraphEntity, max_chars: usize) {
    for key in EVENT_TEXT_KEYS {
        if let Some(serde_json::Value::String(text)) = entity.properties.get_mut(key) {
            if text.chars().count() > max_chars {
                *text = truncate_chars(text, max_chars).to_string();
            }
        }
    }
}

/// Keep the `max_chapters` most recent chapters, each body cut to
/// `max_chars`. Output is in reading order.
pub fn cap_recent_chapters(
    mut chapters: Vec<ChapterText>,
    max_chapters: usize,
    max_chars: usize,
) -> Vec<ChapterText> {
    chapters.sort_by(|a, b| b.chapter_number.cmp(&a.chapter_number));
    chapters.truncate(max_chapters);
    chapters.reverse();
    for chapter in &mut chapters {
        if chapter.content.chars().count() > max_chars {
            chapter.content = truncate_chars(&chapter.content, max_chars).to_string();
        }
    }
    chapters
}

/// Keep the `max_summaries` most recent summaries, in reading order.
pub fn cap_summaries(mut summaries: Vec<ChapterSummary>, max_summaries: usize) -> Vec<ChapterSummary> {
    summaries.sort_by(|a, b| b.chapter_number.cmp(&a.chapter_number));
    summaries.truncate(max_summaries);
    summaries.reverse();
    summaries
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chronicle_core::GraphEntityKind;
    use chronicle_test_utils::generators::arb_graph_entity;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Output never exceeds the cap, is sorted, and clears the threshold.
        #[test]
        fn prop_filter_respects_budget(
            entities in prop::collection::vec(arb_graph_entity(GraphEntityKind::Event), 0..40),
            cap in 0usize..12,
            threshold in 0.0f64..=1.0,
        ) {
            let ranked = filter_category(entities, cap, threshold);
            prop_assert!(ranked.len() <= cap);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].importance >= pair[1].importance);
            }
            for r in &ranked {
                prop_assert!(r.importance >= threshold);
            }
        }
    }
}
