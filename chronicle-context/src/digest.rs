//! Compact digest of the highest-priority filtered material.

use crate::filter::RankedEntity;
use chronicle_core::{truncate_chars, BudgetPolicy, ChapterNumber, GraphEntity, OpenQuest};
use serde::{Deserialize, Serialize};

const CHARACTER_KEYS: [&str; 3] = ["character_name", "characterName", "character"];
const PROGRESS_KEYS: [&str; 4] = ["current_state", "currentState", "progress", "stage"];
const LAST_ACTIVE_KEYS: [&str; 3] = ["last_active_chapter", "lastActiveChapter", "last_chapter"];
const DIGEST_LINE_CHARS: usize = 160;

/// What matters most for the next chapter, pre-formatted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDigest {
    pub primary_conflict_id: Option<String>,
    pub primary_conflict_name: Option<String>,
    pub primary_plotline_id: Option<String>,
    pub primary_plotline_name: Option<String>,
    /// Character named by the top character arc
    pub focus_character: Option<String>,
    /// "chapter N: description"
    pub event_highlights: Vec<String>,
    pub conflict_line: Option<String>,
    pub urgent_foreshadow: Option<String>,
    pub character_progress: Option<String>,
    pub plotline_alerts: Vec<String>,
    pub quest_alerts: Vec<String>,
}

impl ContextDigest {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// All populated lines, in display order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(line) = &self.conflict_line {
            lines.push(format!("Primary conflict: {}", line));
        }
        if let Some(name) = &self.primary_plotline_name {
            lines.push(format!("Main plotline: {}", name));
        }
        if let Some(line) = &self.character_progress {
            lines.push(format!("Character progress: {}", line));
        }
        if let Some(line) = &self.urgent_foreshadow {
            lines.push(format!("Urgent foreshadow: {}", line));
        }
        for highlight in &self.event_highlights {
            lines.push(format!("Recent: {}", highlight));
        }
        lines.extend(self.plotline_alerts.iter().cloned());
        lines.extend(self.quest_alerts.iter().cloned());
        lines
    }
}

/// Filtered lists the digest is built from.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub chapter: ChapterNumber,
    pub events: &'a [RankedEntity],
    pub foreshadows: &'a [RankedEntity],
    pub plotlines: &'a [RankedEntity],
    pub conflict_arcs: &'a [RankedEntity],
    pub character_arcs: &'a [RankedEntity],
    pub open_quests: &'a [OpenQuest],
}

fn short(text: &str) -> String {
    truncate_chars(text.trim(), DIGEST_LINE_CHARS).to_string()
}

fn headline(entity: &GraphEntity) -> String {
    match entity.description() {
        Some(description) => short(&format!("{}: {}", entity.name(), description)),
        None => short(entity.name()),
    }
}

fn first_str<'a>(entity: &'a GraphEntity, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| entity.prop_str(key))
}

/// Last chapter a plotline saw activity.
fn last_active_chapter(entity: &GraphEntity) -> ChapterNumber {
    LAST_ACTIVE_KEYS
        .iter()
        .find_map(|key| entity.prop_f64(key))
        .filter(|v| *v >= 0.0)
        .map(|v| v as ChapterNumber)
        .unwrap_or(entity.chapter_number)
}

/// Plotline idle alerts, oldest activity first.
pub fn plotline_alerts(
    plotlines: &[RankedEntity],
    chapter: ChapterNumber,
    policy: &BudgetPolicy,
) -> Vec<String> {
    let mut idle: Vec<(ChapterNumber, &GraphEntity)> = plotlines
        .iter()
        .map(|r| (last_active_chapter(&r.entity), &r.entity))
        .filter(|(last, _)| chapter.saturating_sub(*last) >= policy.plotline_idle_chapters)
        .collect();
    idle.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
    idle.into_iter()
        .take(policy.max_plotline_alerts)
        .map(|(last, entity)| format!("plotline '{}' idle since chapter {}", entity.name(), last))
        .collect()
}

/// Overdue quest alerts, most overdue first.
pub fn quest_alerts(quests: &[OpenQuest], chapter: ChapterNumber, policy: &BudgetPolicy) -> Vec<String> {
    let mut overdue: Vec<&OpenQuest> = quests.iter().filter(|q| q.is_overdue(chapter)).collect();
    overdue.sort_by(|a, b| a.due_chapter.cmp(&b.due_chapter).then_with(|| a.id.cmp(&b.id)));
    overdue
        .into_iter()
        .take(policy.max_quest_alerts)
        .map(|q| format!("quest '{}' overdue since chapter {}", q.description, q.due_chapter))
        .collect()
}

/// The foreshadow with the highest urgency, falling back to rank order.
fn most_urgent(foreshadows: &[RankedEntity]) -> Option<&GraphEntity> {
    foreshadows
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            let ua = a.entity.prop_f64("urgency").unwrap_or(f64::NEG_INFINITY);
            let ub = b.entity.prop_f64("urgency").unwrap_or(f64::NEG_INFINITY);
            ua.partial_cmp(&ub)
                .unwrap_or(std::cmp::Ordering::Equal)
                // earlier rank wins ties
                .then_with(|| ib.cmp(ia))
        })
        .map(|(_, r)| &r.entity)
}

/// Build the digest from already-filtered lists.
pub fn build_digest(input: &DigestInput<'_>, policy: &BudgetPolicy) -> ContextDigest {
    let conflict = input.conflict_arcs.first().map(|r| &r.entity);
    let plotline = input.plotlines.first().map(|r| &r.entity);
    let arc = input.character_arcs.first().map(|r| &r.entity);

    let focus_character = arc.map(|a| first_str(a, &CHARACTER_KEYS).unwrap_or(a.name()).to_string());
    let character_progress = arc.and_then(|a| {
        let character = first_str(a, &CHARACTER_KEYS).unwrap_or(a.name());
        first_str(a, &PROGRESS_KEYS)
            .or_else(|| a.description())
            .map(|progress| short(&format!("{}: {}", character, progress)))
    });

    ContextDigest {
        primary_conflict_id: conflict.map(|c| c.id.clone()),
        primary_conflict_name: conflict.map(|c| c.name().to_string()),
        primary_plotline_id: plotline.map(|p| p.id.clone()),
        primary_plotline_name: plotline.map(|p| p.name().to_string()),
        focus_character,
        event_highlights: input
            .events
            .iter()
            .take(policy.max_event_highlights)
            .map(|r| {
                let text = r.entity.description().unwrap_or(r.entity.name());
                short(&format!("chapter {}: {}", r.entity.chapter_number, text))
            })
            .collect(),
        conflict_line: conflict.map(headline),
        urgent_foreshadow: most_urgent(input.foreshadows).map(headline),
        character_progress,
        plotline_alerts: plotline_alerts(input.plotlines, input.chapter, policy),
        quest_alerts: quest_alerts(input.open_quests, input.chapter, policy),
    }
}
