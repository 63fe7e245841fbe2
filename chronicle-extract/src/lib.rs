//! Chronicle Extract - Chapter State Extraction and Merge
//!
//! After a chapter is written, a single text generation call pulls
//! continuity facts out of it: the protagonist's snapshot, a few key
//! characters with their relation to the protagonist, and quest progress.
//! The facts are merged into the entity store best-effort. A failed call or
//! an unparseable response skips the chapter without writing anything.

pub mod conflict;
pub mod engine;
pub mod payload;
pub mod prompt;
pub mod quest;
pub mod relation;
pub mod report;

pub use conflict::{detect_conflicts, ConflictWarning};
pub use engine::StateExtractor;
pub use payload::{parse_extraction, sanitize, CharacterRecord, ExtractionRecord, QuestProgress};
pub use prompt::{build_extraction_prompt, PromptInput, EXTRACTION_SYSTEM_PROMPT};
pub use quest::{classify_progress, due_chapter, QuestSignal};
pub use relation::{classify_relation, relation_strength, RelationClass};
pub use report::{MergeReport, MergeStatus};
