//! Extraction prompt construction.

use chronicle_core::{truncate_chars, ChapterNumber, ExtractionPolicy, OpenQuest};

/// System instruction describing the output contract.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You extract continuity facts from fiction chapters. \
Respond with a single JSON object and nothing else.";

const OUTPUT_CONTRACT: &str = r#"Return JSON with exactly this shape:
{
  "protagonist": {"name": "", "location": "", "realm": "", "alive": true, "status": "", "inventory": []},
  "key_characters": [
    {"name": "", "location": "", "realm": "", "alive": true, "status": "", "relation": ""}
  ],
  "quest_progress": {"<quest name>": "<progress phrase>"}
}
Rules:
- At most 3 key_characters, the ones most important to this chapter.
- "relation" describes the character's relationship to the protagonist.
- Omit fields you cannot determine; omit "inventory" if it did not change.
- For quests use phrases such as "progressing", "stalled" or "completed"."#;

/// Inputs for one extraction prompt.
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub chapter_number: ChapterNumber,
    pub chapter_title: &'a str,
    pub chapter_text: &'a str,
    /// Existing canonical character names, qualifiers included
    pub roster: &'a [String],
    pub open_quests: &'a [OpenQuest],
}

/// Build the user prompt. The roster and quest names are embedded so the
/// generator reuses existing identities instead of minting near-duplicates.
pub fn build_extraction_prompt(input: &PromptInput<'_>, policy: &ExtractionPolicy) -> String {
    let mut prompt = String::with_capacity(input.chapter_text.len().min(policy.prompt_chapter_chars) + 1024);

    prompt.push_str(OUTPUT_CONTRACT);
    prompt.push_str("\n\n");

    if !input.roster.is_empty() {
        prompt.push_str(
            "Known characters. Reuse these names verbatim, including any parenthetical qualifier:\n",
        );
        for name in input.roster.iter().take(policy.roster_limit) {
            prompt.push_str("- ");
            prompt.push_str(name);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if !input.open_quests.is_empty() {
        prompt.push_str("Open quests. Reuse these names when reporting progress:\n");
        for quest in input.open_quests {
            prompt.push_str(&format!(
                "- {} (due by chapter {})\n",
                quest.description, quest.due_chapter
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "Chapter {}: {}\n\n",
        input.chapter_number,
        input.chapter_title.trim()
    ));
    prompt.push_str(truncate_chars(input.chapter_text, policy.prompt_chapter_chars));
    prompt
}
