//! Chronicle Context - Budgeted Context Assembly
//!
//! Picks the most useful slice of a novel's story graph for the next
//! chapter's prompt. Early chapters and sparse graphs pass through
//! untouched; otherwise each category is ranked by importance, thresholded
//! and capped, and a short digest of key points is attached. The result can
//! be rendered into prioritized sections within a token budget.

pub mod assembler;
pub mod candidates;
pub mod digest;
pub mod filter;
pub mod importance;
pub mod render;

pub use assembler::{ContextAssembler, OptimizedContext};
pub use candidates::{load_candidates, ContextCandidates};
pub use digest::{build_digest, plotline_alerts, quest_alerts, ContextDigest, DigestInput};
pub use filter::{
    cap_recent_chapters, cap_summaries, filter_category, rank_unfiltered, top_ranked,
    truncate_event_text, RankedEntity,
};
pub use importance::{
    importance_score, label_importance, resolve_importance, ImportanceSource, ResolvedImportance,
};
pub use render::{
    estimate_tokens, render_context, truncate_to_token_budget, AssemblyAction, AssemblyDecision,
    ContextSection, ContextWindow, SectionType, SourceRef,
};
