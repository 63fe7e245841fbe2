//! Token-budgeted rendering of an optimized context into prompt sections.

use crate::assembler::OptimizedContext;
use crate::filter::RankedEntity;
use chronicle_core::{GraphEntityKind, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CONTEXT WINDOW AND SECTION
// ============================================================================

/// Kind of prompt section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionType {
    Digest,
    Conflicts,
    Foreshadows,
    Characters,
    Quests,
    Plotlines,
    Events,
    Summaries,
    RecentChapters,
}

impl SectionType {
    /// Higher renders first and survives tighter budgets.
    pub fn priority(&self) -> i32 {
        match self {
            SectionType::Digest => 100,
            SectionType::Conflicts => 90,
            SectionType::Foreshadows => 85,
            SectionType::Characters => 80,
            SectionType::Quests => 75,
            SectionType::Plotlines => 70,
            SectionType::Events => 65,
            SectionType::Summaries => 50,
            SectionType::RecentChapters => 40,
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            SectionType::Digest => "## Key points",
            SectionType::Conflicts => "## Conflicts",
            SectionType::Foreshadows => "## Foreshadowing",
            SectionType::Characters => "## Characters",
            SectionType::Quests => "## Open quests",
            SectionType::Plotlines => "## Plotlines",
            SectionType::Events => "## Recent events",
            SectionType::Summaries => "## Earlier chapters",
            SectionType::RecentChapters => "## Previous chapter text",
        }
    }
}

/// A graph entity that contributed to a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: GraphEntityKind,
    pub id: String,
    pub importance: f64,
}

/// One rendered section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub section_id: Uuid,
    pub section_type: SectionType,
    pub content: String,
    pub token_count: i32,
    pub priority: i32,
    /// Whether the section may be cut to fit
    pub compressible: bool,
    pub sources: Vec<SourceRef>,
}

impl ContextSection {
    pub fn new(section_type: SectionType, content: String) -> Self {
        let token_count = estimate_tokens(&content);
        Self {
            section_id: Uuid::now_v7(),
            section_type,
            content,
            token_count,
            priority: section_type.priority(),
            compressible: true,
            sources: Vec::new(),
        }
    }

    pub fn with_compressible(mut self, compressible: bool) -> Self {
        self.compressible = compressible;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }
}

/// Action taken for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssemblyAction {
    Include,
    Exclude,
    Truncate,
}

/// Trace entry explaining one section decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyDecision {
    pub timestamp: Timestamp,
    pub action: AssemblyAction,
    pub section_type: SectionType,
    pub reason: String,
    pub tokens_affected: i32,
}

/// Rendered sections within a token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub window_id: Uuid,
    pub assembled_at: Timestamp,
    pub max_tokens: i32,
    pub used_tokens: i32,
    /// In priority order
    pub sections: Vec<ContextSection>,
    pub truncated: bool,
    pub assembly_trace: Vec<AssemblyDecision>,
}

impl ContextWindow {
    pub fn new(max_tokens: i32) -> Self {
        Self {
            window_id: Uuid::now_v7(),
            assembled_at: Utc::now(),
            max_tokens,
            used_tokens: 0,
            sections: Vec::new(),
            truncated: false,
            assembly_trace: Vec::new(),
        }
    }

    pub fn remaining_tokens(&self) -> i32 {
        self.max_tokens - self.used_tokens
    }

    fn record(&mut self, action: AssemblyAction, section: &ContextSection, reason: String, tokens: i32) {
        self.assembly_trace.push(AssemblyDecision {
            timestamp: Utc::now(),
            action,
            section_type: section.section_type,
            reason,
            tokens_affected: tokens,
        });
    }

    /// Add a section whole, or truncate it when compressible. Returns
    /// whether anything was added.
    pub fn add_section(&mut self, mut section: ContextSection) -> bool {
        let available = self.remaining_tokens();

        if section.token_count <= available {
            self.used_tokens += section.token_count;
            let tokens = section.token_count;
            self.record(AssemblyAction::Include, &section, "Fits within budget".to_string(), tokens);
            self.sections.push(section);
            return true;
        }

        if available <= 0 || !section.compressible {
            let reason = if available <= 0 {
                "Budget exhausted".to_string()
            } else {
                format!(
                    "Exceeds budget ({} tokens, {} available) and not compressible",
                    section.token_count, available
                )
            };
            self.record(AssemblyAction::Exclude, &section, reason, 0);
            return false;
        }

        let original = section.token_count;
        section.content = truncate_to_token_budget(&section.content, available);
        section.token_count = estimate_tokens(&section.content);
        if section.content.is_empty() {
            self.record(AssemblyAction::Exclude, &section, "Nothing left after truncation".to_string(), 0);
            return false;
        }

        self.used_tokens += section.token_count;
        self.truncated = true;
        let tokens = section.token_count;
        self.record(
            AssemblyAction::Truncate,
            &section,
            format!("Truncated from {} to {} tokens", original, tokens),
            tokens,
        );
        self.sections.push(section);
        true
    }

    pub fn section(&self, section_type: SectionType) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.section_type == section_type)
    }

    pub fn as_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl std::fmt::Display for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

// ============================================================================
// TOKEN UTILITIES
// ============================================================================

/// Estimate token count: ~0.75 tokens per byte, rounded up.
pub fn estimate_tokens(text: &str) -> i32 {
    if text.is_empty() {
        return 0;
    }
    (text.len() as f32 * 0.75).ceil() as i32
}

const SENTENCE_ENDS: [char; 6] = ['.', '?', '!', '。', '？', '！'];

/// Truncate text to fit a token budget.
/// Prefers sentence boundaries, then word boundaries.
pub fn truncate_to_token_budget(text: &str, budget: i32) -> String {
    if budget <= 0 {
        return String::new();
    }

    let max_bytes = (budget as f32 / 0.75).floor() as usize;
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let truncated = safe_truncate(text, max_bytes);

    let last_sentence = truncated
        .char_indices()
        .filter(|(_, c)| SENTENCE_ENDS.contains(c))
        .map(|(i, c)| i + c.len_utf8())
        .last();
    if let Some(end) = last_sentence {
        if end > max_bytes / 2 {
            return truncated[..end].to_string();
        }
    }

    if let Some(pos) = truncated.rfind(' ') {
        if pos > max_bytes * 4 / 5 {
            return truncated[..pos].to_string();
        }
    }

    truncated.to_string()
}

/// Cut at the last UTF-8 boundary at or before `max_bytes`.
fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// RENDERING
// ============================================================================

fn entity_lines(entities: &[RankedEntity]) -> String {
    entities
        .iter()
        .map(|r| match r.entity.description() {
            Some(description) => format!(
                "- {} (chapter {}): {}",
                r.entity.name(),
                r.entity.chapter_number,
                description
            ),
            None => format!("- {} (chapter {})", r.entity.name(), r.entity.chapter_number),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sources(entities: &[RankedEntity]) -> Vec<SourceRef> {
    entities
        .iter()
        .map(|r| SourceRef {
            kind: r.entity.kind,
            id: r.entity.id.clone(),
            importance: r.importance,
        })
        .collect()
}

fn with_heading(section_type: SectionType, body: String) -> String {
    format!("{}\n{}", section_type.heading(), body)
}

fn entity_section(section_type: SectionType, entities: &[RankedEntity]) -> Option<ContextSection> {
    if entities.is_empty() {
        return None;
    }
    Some(
        ContextSection::new(section_type, with_heading(section_type, entity_lines(entities)))
            .with_sources(sources(entities)),
    )
}

fn build_sections(context: &OptimizedContext) -> Vec<ContextSection> {
    let mut sections = Vec::new();

    if let Some(digest) = context.digest.as_ref().filter(|d| !d.is_empty()) {
        let body = digest
            .lines()
            .into_iter()
            .map(|line| format!("- {}", line))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(
            ContextSection::new(SectionType::Digest, with_heading(SectionType::Digest, body))
                .with_compressible(false),
        );
    }

    let mut conflicts = context.conflict_arcs.clone();
    conflicts.extend(context.character_arcs.iter().cloned());
    sections.extend(entity_section(SectionType::Conflicts, &conflicts));
    sections.extend(entity_section(SectionType::Foreshadows, &context.foreshadows));

    if !context.characters.is_empty()
        || !context.relationships.is_empty()
        || !context.character_profiles.is_empty()
    {
        let mut lines: Vec<String> = context
            .characters
            .iter()
            .map(|c| {
                let mut facts = Vec::new();
                if let Some(location) = &c.location {
                    facts.push(format!("at {}", location));
                }
                if let Some(realm) = &c.realm {
                    facts.push(format!("realm {}", realm));
                }
                if !c.alive {
                    facts.push("dead".to_string());
                }
                if let Some(status) = &c.status {
                    facts.push(status.clone());
                }
                if !c.inventory.is_empty() {
                    facts.push(format!("carries {}", c.inventory.join(", ")));
                }
                format!("- {}: {} (last seen chapter {})", c.name, facts.join("; "), c.last_seen_chapter)
            })
            .collect();
        lines.extend(context.relationships.iter().map(|r| {
            format!(
                "- {} / {}: {} ({:.2})",
                r.character_a, r.character_b, r.relation_type, r.strength
            )
        }));
        if !context.character_profiles.is_empty() {
            lines.push(entity_lines(&context.character_profiles));
        }
        sections.push(
            ContextSection::new(
                SectionType::Characters,
                with_heading(SectionType::Characters, lines.join("\n")),
            )
            .with_sources(sources(&context.character_profiles)),
        );
    }

    if !context.open_quests.is_empty() {
        let body = context
            .open_quests
            .iter()
            .map(|q| match &q.last_progress {
                Some(progress) => format!("- {} (due chapter {}): {}", q.description, q.due_chapter, progress),
                None => format!("- {} (due chapter {})", q.description, q.due_chapter),
            })
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(ContextSection::new(SectionType::Quests, with_heading(SectionType::Quests, body)));
    }

    sections.extend(entity_section(SectionType::Plotlines, &context.plotlines));
    sections.extend(entity_section(SectionType::Events, &context.events));

    if !context.summaries.is_empty() {
        let body = context
            .summaries
            .iter()
            .map(|s| format!("Chapter {}: {}", s.chapter_number, s.summary))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(ContextSection::new(
            SectionType::Summaries,
            with_heading(SectionType::Summaries, body),
        ));
    }

    if !context.recent_chapters.is_empty() {
        let body = context
            .recent_chapters
            .iter()
            .map(|c| format!("### Chapter {}: {}\n{}", c.chapter_number, c.title, c.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        sections.push(ContextSection::new(
            SectionType::RecentChapters,
            with_heading(SectionType::RecentChapters, body),
        ));
    }

    sections
}

/// Render `context` into prioritized sections within `token_budget`.
pub fn render_context(context: &OptimizedContext, token_budget: i32) -> ContextWindow {
    let mut window = ContextWindow::new(token_budget);
    let mut sections = build_sections(context);
    sections.sort_by(|a, b| b.priority.cmp(&a.priority));
    for section in sections {
        window.add_section(section);
    }
    window
}
