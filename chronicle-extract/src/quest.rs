//! Quest progress phrase classification.

use chronicle_core::{ChapterNumber, ExtractionPolicy};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a progress phrase says about its quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestSignal {
    Resolved,
    Stalled,
    Progressing,
}

const NEGATED_COMPLETION_ZH: &[&str] = &["未完成", "尚未", "没有完成", "未解决", "未能"];
const RESOLVED_ZH: &[&str] = &["完成", "解决", "达成", "结束", "了结"];
const STALLED_ZH: &[&str] = &["停滞", "受阻", "搁置", "暂停", "卡住", "僵局"];

static NEGATED_COMPLETION_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(incomplete|unfinished|unresolved|not\s+yet|not\s+(?:been\s+)?(?:complete|completed|done|finished|resolved|solved|fulfilled))\b",
    )
    .expect("negated completion regex")
});

static RESOLVED_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(resolved|completed?|done|fulfilled|finished|solved|accomplished)\b")
        .expect("resolved regex")
});

static STALLED_EN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(stalled|blocked|stuck|paused|on\s+hold|halted|delayed|postponed)\b")
        .expect("stalled regex")
});

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify a progress phrase.
///
/// Negated completion ("not yet complete", "未完成") is checked first and is
/// never a resolution. Anything neither resolved nor stalled is treated as
/// forward progress.
pub fn classify_progress(phrase: &str) -> QuestSignal {
    let phrase = phrase.trim();
    let negated = NEGATED_COMPLETION_EN.is_match(phrase) || contains_any(phrase, NEGATED_COMPLETION_ZH);

    if !negated && (RESOLVED_EN.is_match(phrase) || contains_any(phrase, RESOLVED_ZH)) {
        return QuestSignal::Resolved;
    }
    if STALLED_EN.is_match(phrase) || contains_any(phrase, STALLED_ZH) {
        return QuestSignal::Stalled;
    }
    QuestSignal::Progressing
}

/// Due chapter for an open quest given its signal.
pub fn due_chapter(
    chapter: ChapterNumber,
    signal: QuestSignal,
    policy: &ExtractionPolicy,
) -> ChapterNumber {
    let offset = match signal {
        QuestSignal::Stalled => policy.stalled_due_offset,
        _ => policy.progress_due_offset,
    };
    chapter.saturating_add(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_phrases() {
        for phrase in ["Completed", "quest done", "finally resolved", "已完成", "问题解决了"] {
            assert_eq!(classify_progress(phrase), QuestSignal::Resolved, "{}", phrase);
        }
    }

    #[test]
    fn test_negated_completion_is_not_resolved() {
        for phrase in ["not yet complete", "incomplete", "still unfinished", "未完成", "尚未解决"] {
            assert_ne!(classify_progress(phrase), QuestSignal::Resolved, "{}", phrase);
        }
    }

    #[test]
    fn test_stalled_phrases() {
        for phrase in ["stalled", "Blocked by the sect", "on hold", "进展停滞", "暂时搁置"] {
            assert_eq!(classify_progress(phrase), QuestSignal::Stalled, "{}", phrase);
        }
        assert_eq!(classify_progress("not yet finished, stuck"), QuestSignal::Stalled);
    }

    #[test]
    fn test_word_boundaries() {
        // "abandoned" contains "done" but is not a completion
        assert_eq!(classify_progress("abandoned camp searched"), QuestSignal::Progressing);
        assert_eq!(classify_progress("unblocked path"), QuestSignal::Progressing);
    }

    #[test]
    fn test_default_is_progressing() {
        assert_eq!(classify_progress("found a clue"), QuestSignal::Progressing);
        assert_eq!(classify_progress(""), QuestSignal::Progressing);
    }

    #[test]
    fn test_due_offsets() {
        let policy = ExtractionPolicy::default();
        assert_eq!(due_chapter(20, QuestSignal::Progressing, &policy), 25);
        assert_eq!(due_chapter(20, QuestSignal::Stalled, &policy), 30);
        assert_eq!(due_chapter(u32::MAX, QuestSignal::Stalled, &policy), u32::MAX);
    }
}
