//! Exact-string canonicalization for names extracted from free text.
//!
//! There is no fuzzy matching here. Duplicate identities are avoided by
//! feeding the existing roster back into the extraction prompt and then
//! keying storage on the exact strings produced below.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-]+").expect("separator regex"));
static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"_+").expect("underscore regex"));

/// Join character used in quest ids.
pub const QUEST_ID_JOIN: char = '_';

fn is_leading_separator(c: char) -> bool {
    c.is_whitespace() || c == '-' || c == '_' || c == ':'
}

fn strip_quest_prefix(s: &str) -> Option<&str> {
    let head = s.get(..2)?;
    if head.eq_ignore_ascii_case("q-") || head.eq_ignore_ascii_case("q_") {
        s.get(2..)
    } else {
        None
    }
}

/// Derive a stable quest id from a free-text quest name.
///
/// Leading separators and `Q-` / `Q_` prefixes (any case, repeated) are
/// stripped, the rest is lowercased and runs of whitespace or hyphens are
/// folded into a single `_`. Returns `None` when nothing is left.
///
/// ```
/// use chronicle_core::normalize_quest_id;
///
/// assert_eq!(normalize_quest_id("Q-Find The Sword").as_deref(), Some("find_the_sword"));
/// assert_eq!(normalize_quest_id("q_ find the sword").as_deref(), Some("find_the_sword"));
/// assert_eq!(normalize_quest_id("   "), None);
/// ```
pub fn normalize_quest_id(raw: &str) -> Option<String> {
    let mut rest = raw.trim();
    loop {
        let trimmed = rest.trim_start_matches(is_leading_separator);
        let stripped = strip_quest_prefix(trimmed).unwrap_or(trimmed);
        if stripped.len() == rest.len() {
            break;
        }
        rest = stripped;
    }

    let lowered = rest.trim().to_lowercase();
    let folded = SEPARATOR_RUN.replace_all(&lowered, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&folded, "_");
    let id = collapsed.trim_matches(QUEST_ID_JOIN);

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Canonical character key: the trimmed name, or `None` when blank.
/// Qualifiers such as `"(elder)"` are kept verbatim.
pub fn canonical_character_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Order an unordered character pair into its storage key.
pub fn relation_pair(a: &str, b: &str) -> (String, String) {
    let a = a.trim();
    let b = b.trim();
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quest_id_variants_converge() {
        let expected = Some("find_the_sword".to_string());
        assert_eq!(normalize_quest_id("Q-Find The Sword"), expected);
        assert_eq!(normalize_quest_id("q_ find the sword"), expected);
        assert_eq!(normalize_quest_id("Find The Sword"), expected);
        assert_eq!(normalize_quest_id("Q-q_Find-the  sword"), expected);
        assert_eq!(normalize_quest_id("  -Find_the_sword_ "), expected);
    }

    #[test]
    fn test_quest_id_keeps_non_prefix_q() {
        assert_eq!(
            normalize_quest_id("Queen's Ransom").as_deref(),
            Some("queen's_ransom")
        );
        assert_eq!(normalize_quest_id("Q").as_deref(), Some("q"));
    }

    #[test]
    fn test_quest_id_non_ascii() {
        assert_eq!(normalize_quest_id("Q-寻找 神剑").as_deref(), Some("寻找_神剑"));
        assert_eq!(normalize_quest_id("寻找神剑").as_deref(), Some("寻找神剑"));
    }

    #[test]
    fn test_quest_id_blank() {
        assert_eq!(normalize_quest_id(""), None);
        assert_eq!(normalize_quest_id("Q-"), None);
        assert_eq!(normalize_quest_id(" q_ - "), None);
    }

    #[test]
    fn test_relation_pair_is_symmetric() {
        assert_eq!(relation_pair("Su Yan", "Lin Feng"), relation_pair("Lin Feng", "Su Yan"));
        assert_eq!(
            relation_pair(" Lin Feng ", "Su Yan"),
            ("Lin Feng".to_string(), "Su Yan".to_string())
        );
    }

    #[test]
    fn test_character_name_keeps_qualifier() {
        assert_eq!(
            canonical_character_name("  Lin Feng (elder) ").as_deref(),
            Some("Lin Feng (elder)")
        );
        assert_eq!(canonical_character_name("\t"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 3), "hi");
        assert_eq!(truncate_chars("日本語", 2), "日本");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Truncation never grows text and respects the limit.
        #[test]
        fn prop_truncate_chars_bounded(text in ".{0,300}", max in 0usize..200) {
            let out = truncate_chars(&text, max);
            prop_assert!(out.chars().count() <= max);
            prop_assert!(text.starts_with(out));
        }

        #[test]
        fn prop_quest_id_shape(raw in "[A-Za-z _\\-]{0,30}") {
            if let Some(id) = normalize_quest_id(&raw) {
                prop_assert!(!id.contains(' '));
                prop_assert!(!id.contains('-'));
                prop_assert!(!id.contains("__"));
                prop_assert!(!id.starts_with('_') && !id.ends_with('_'));
                if !id.starts_with("q_") {
                    prop_assert_eq!(normalize_quest_id(&id), Some(id.clone()));
                }
            }
        }

        #[test]
        fn prop_prefix_does_not_change_id(name in "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]") {
            prop_assert_eq!(
                normalize_quest_id(&format!("Q-{}", name)),
                normalize_quest_id(&name)
            );
        }

        #[test]
        fn prop_relation_pair_symmetric(a in "[A-Za-z]{1,10}", b in "[A-Za-z]{1,10}") {
            prop_assert_eq!(relation_pair(&a, &b), relation_pair(&b, &a));
        }
    }
}
