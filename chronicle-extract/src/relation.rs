//! Deterministic relation-text to strength lookup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relationship class recognized from free relation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationClass {
    Hostile,
    Intimate,
    Allied,
    Rival,
    Friendly,
    Acquainted,
    Stranger,
    Unclassified,
}

impl RelationClass {
    /// Table strength, or `None` for unclassified text.
    pub fn strength(&self) -> Option<f64> {
        match self {
            RelationClass::Hostile => Some(0.9),
            RelationClass::Intimate => Some(0.95),
            RelationClass::Allied => Some(0.8),
            RelationClass::Rival => Some(0.7),
            RelationClass::Friendly => Some(0.6),
            RelationClass::Acquainted => Some(0.4),
            RelationClass::Stranger => Some(0.2),
            RelationClass::Unclassified => None,
        }
    }
}

impl fmt::Display for RelationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RelationClass::Hostile => "hostile",
            RelationClass::Intimate => "intimate",
            RelationClass::Allied => "allied",
            RelationClass::Rival => "rival",
            RelationClass::Friendly => "friendly",
            RelationClass::Acquainted => "acquainted",
            RelationClass::Stranger => "stranger",
            RelationClass::Unclassified => "unclassified",
        };
        write!(f, "{}", value)
    }
}

struct RelationRule {
    class: RelationClass,
    cjk: &'static [&'static str],
    latin: Regex,
}

impl RelationRule {
    fn new(class: RelationClass, cjk: &'static [&'static str], latin: &str) -> Self {
        Self {
            class,
            cjk,
            latin: Regex::new(&format!(r"(?i)\b(?:{})\b", latin)).expect("relation keyword regex"),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.cjk.iter().any(|k| text.contains(k)) || self.latin.is_match(text)
    }
}

/// Checked top to bottom; the first class with a matching keyword wins.
/// CJK keywords match as substrings, Latin keywords only as whole words.
static RELATION_RULES: Lazy<Vec<RelationRule>> = Lazy::new(|| {
    vec![
        RelationRule::new(
            RelationClass::Hostile,
            &["敌", "仇"],
            r"hostile|enem(?:y|ies)|foes?|nemesis|unfriendly|hatred",
        ),
        RelationRule::new(
            RelationClass::Intimate,
            &["恋", "爱", "道侣", "夫妻"],
            r"lovers?|romantic|intimate|spouses?|beloved|betrothed|boyfriend|girlfriend",
        ),
        RelationRule::new(
            RelationClass::Allied,
            &["盟", "同伴", "伙伴"],
            r"all(?:y|ies|ied|iance)|cooperat\w*|partners?|comrades?|companions?",
        ),
        RelationRule::new(
            RelationClass::Rival,
            &["竞争", "对手"],
            r"rivals?|rivalry|competitors?",
        ),
        RelationRule::new(
            RelationClass::Friendly,
            &["友"],
            r"friends?|friendly|friendship",
        ),
        RelationRule::new(
            RelationClass::Acquainted,
            &["相识", "认识", "熟人"],
            r"acquaint\w*",
        ),
        RelationRule::new(
            RelationClass::Stranger,
            &["陌生"],
            r"strangers?|unknown",
        ),
    ]
});

/// Classify relation text by keyword.
pub fn classify_relation(text: &str) -> RelationClass {
    let text = text.trim();
    if text.is_empty() {
        return RelationClass::Unclassified;
    }
    RELATION_RULES
        .iter()
        .find(|rule| rule.matches(text))
        .map(|rule| rule.class)
        .unwrap_or(RelationClass::Unclassified)
}

/// Strength for relation text, falling back to `default` when unclassified.
pub fn relation_strength(text: &str, default: f64) -> f64 {
    classify_relation(text).strength().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_strengths() {
        assert_eq!(relation_strength("sworn enemy", 0.5), 0.9);
        assert_eq!(relation_strength("Lover", 0.5), 0.95);
        assert_eq!(relation_strength("uneasy ally", 0.5), 0.8);
        assert_eq!(relation_strength("rival disciple", 0.5), 0.7);
        assert_eq!(relation_strength("old friend", 0.5), 0.6);
        assert_eq!(relation_strength("acquaintance", 0.5), 0.4);
        assert_eq!(relation_strength("stranger", 0.5), 0.2);
        assert_eq!(relation_strength("master and disciple", 0.5), 0.5);
    }

    #[test]
    fn test_chinese_keywords() {
        assert_eq!(classify_relation("宿敌"), RelationClass::Hostile);
        assert_eq!(classify_relation("道侣"), RelationClass::Intimate);
        assert_eq!(classify_relation("盟友"), RelationClass::Allied);
        assert_eq!(classify_relation("竞争对手"), RelationClass::Rival);
        assert_eq!(classify_relation("朋友"), RelationClass::Friendly);
        assert_eq!(classify_relation("初次相识"), RelationClass::Acquainted);
        assert_eq!(classify_relation("陌生人"), RelationClass::Stranger);
    }

    #[test]
    fn test_unfriendly_is_hostile() {
        assert_eq!(classify_relation("Unfriendly"), RelationClass::Hostile);
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        assert_eq!(relation_strength("formally acquainted", 0.5), 0.4);
        assert_eq!(relation_strength("mentally scarred stranger", 0.5), 0.2);
        assert_eq!(classify_relation("really close friend"), RelationClass::Friendly);
        assert_eq!(classify_relation("Boyfriend"), RelationClass::Intimate);
        assert_eq!(classify_relation("her girlfriend"), RelationClass::Intimate);
        assert_eq!(classify_relation("totally neutral"), RelationClass::Unclassified);
    }

    #[test]
    fn test_blank_is_unclassified() {
        assert_eq!(classify_relation("   "), RelationClass::Unclassified);
        assert_eq!(relation_strength("", 0.33), 0.33);
    }
}
