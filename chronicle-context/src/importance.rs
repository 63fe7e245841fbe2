//! Importance resolution for narrative graph entities.
//!
//! Graph entities are written by several collaborators, each with its own
//! idea of how to express "this matters". Resolution walks a fixed chain of
//! properties and takes the first one present.

use chronicle_core::GraphEntity;
use serde::{Deserialize, Serialize};

/// Score used when no signal is present at all.
pub const DEFAULT_IMPORTANCE: f64 = 0.4;

/// Score for a relevance field that is present but not positive.
pub const NON_POSITIVE_RELEVANCE_IMPORTANCE: f64 = 0.3;

/// Score for an importance label outside the vocabulary.
pub const UNKNOWN_LABEL_IMPORTANCE: f64 = 0.45;

const EXPLICIT_SCORE_KEYS: [&str; 2] = ["importance_score", "importanceScore"];

/// Which link of the chain produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceSource {
    ExplicitScore,
    NumericImportance,
    ImportanceLabel,
    Priority,
    Urgency,
    Relevance,
    Default,
}

/// A resolved score and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedImportance {
    pub score: f64,
    pub source: ImportanceSource,
}

/// Map an importance label onto a score.
pub fn label_importance(label: &str) -> f64 {
    let label = label.trim().to_lowercase();
    match label.as_str() {
        "high" | "critical" | "core" | "key" | "核心" | "高" | "关键" | "重要" => 0.9,
        "medium" | "mid" | "moderate" | "normal" | "中" | "中等" | "一般" => 0.6,
        "low" | "minor" | "次要" | "低" => 0.3,
        _ => UNKNOWN_LABEL_IMPORTANCE,
    }
}

/// Resolve an entity's importance, recording the source.
pub fn resolve_importance(entity: &GraphEntity) -> ResolvedImportance {
    let resolved = |score: f64, source| ResolvedImportance {
        score: score.clamp(0.0, 1.0),
        source,
    };

    if let Some(score) = EXPLICIT_SCORE_KEYS.iter().find_map(|k| entity.prop_f64(k)) {
        return resolved(score, ImportanceSource::ExplicitScore);
    }
    if let Some(score) = entity.prop_f64("importance") {
        return resolved(score, ImportanceSource::NumericImportance);
    }
    if let Some(label) = entity.prop_str("importance") {
        return resolved(label_importance(label), ImportanceSource::ImportanceLabel);
    }
    if let Some(priority) = entity.prop_f64("priority") {
        return resolved(priority, ImportanceSource::Priority);
    }
    if let Some(urgency) = entity.prop_f64("urgency").filter(|u| *u > 0.0 && *u <= 1.0) {
        return resolved(urgency, ImportanceSource::Urgency);
    }
    if let Some(relevance) = entity.relevance_score.filter(|r| r.is_finite()) {
        let score = if relevance > 0.0 {
            (relevance / 10.0).min(1.0)
        } else {
            NON_POSITIVE_RELEVANCE_IMPORTANCE
        };
        return resolved(score, ImportanceSource::Relevance);
    }
    resolved(DEFAULT_IMPORTANCE, ImportanceSource::Default)
}

/// Resolved importance score in [0, 1].
pub fn importance_score(entity: &GraphEntity) -> f64 {
    resolve_importance(entity).score
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::GraphEntityKind;
    use serde_json::json;

    fn event() -> GraphEntity {
        GraphEntity::new("e1", GraphEntityKind::Event, 4)
    }

    #[test]
    fn test_explicit_score_wins() {
        let entity = event()
            .with_property("importance_score", json!(0.82))
            .with_property("importance", json!("low"))
            .with_relevance(1.0);
        let resolved = resolve_importance(&entity);
        assert_eq!(resolved.score, 0.82);
        assert_eq!(resolved.source, ImportanceSource::ExplicitScore);

        let camel = event().with_property("importanceScore", json!(0.7));
        assert_eq!(importance_score(&camel), 0.7);
    }

    #[test]
    fn test_numeric_then_label() {
        assert_eq!(importance_score(&event().with_property("importance", json!(0.55))), 0.55);
        assert_eq!(importance_score(&event().with_property("importance", json!("Critical"))), 0.9);
        assert_eq!(importance_score(&event().with_property("importance", json!("核心"))), 0.9);
        assert_eq!(importance_score(&event().with_property("importance", json!("mid"))), 0.6);
        assert_eq!(importance_score(&event().with_property("importance", json!("次要"))), 0.3);
        assert_eq!(importance_score(&event().with_property("importance", json!("whatever"))), 0.45);
    }

    #[test]
    fn test_numbers_outside_unit_range_are_clamped() {
        let score = |v: f64| importance_score(&event().with_property("importance", json!(v)));
        assert_eq!(score(1.2), 1.0);
        assert_eq!(score(2.0), 1.0);
        assert_eq!(score(40.0), 1.0);
        assert_eq!(score(-3.0), 0.0);
        assert!(score(1.2) >= score(0.9));
        assert_eq!(importance_score(&event().with_property("priority", json!(8))), 1.0);
        assert_eq!(importance_score(&event().with_property("importance_score", json!(1.5))), 1.0);
    }

    #[test]
    fn test_urgency_only_in_unit_range() {
        let urgent = event().with_property("urgency", json!(0.75));
        assert_eq!(resolve_importance(&urgent).source, ImportanceSource::Urgency);
        assert_eq!(importance_score(&urgent), 0.75);

        let out_of_range = event().with_property("urgency", json!(5));
        assert_eq!(resolve_importance(&out_of_range).source, ImportanceSource::Default);
        let zero = event().with_property("urgency", json!(0));
        assert_eq!(importance_score(&zero), DEFAULT_IMPORTANCE);
    }

    #[test]
    fn test_relevance_scaling() {
        assert_eq!(importance_score(&event().with_relevance(7.5)), 0.75);
        assert_eq!(importance_score(&event().with_relevance(25.0)), 1.0);
        assert_eq!(importance_score(&event().with_relevance(0.0)), 0.3);
        assert_eq!(importance_score(&event().with_relevance(-1.0)), 0.3);
    }

    #[test]
    fn test_default() {
        let resolved = resolve_importance(&event());
        assert_eq!(resolved.score, 0.4);
        assert_eq!(resolved.source, ImportanceSource::Default);
    }

    #[test]
    fn test_non_numeric_importance_string_number_is_a_label() {
        // "0.9" as a string is not in the vocabulary
        assert_eq!(importance_score(&event().with_property("importance", json!("0.9"))), 0.45);
    }
}
