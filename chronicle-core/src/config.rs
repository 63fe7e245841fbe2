//! Configuration types
//!
//! Every numeric policy used by extraction, context assembly and volume
//! planning lives here and is passed explicitly into each engine.

use crate::{ChronicleError, ChronicleResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "CHRONICLE_CONFIG";

/// Policy for the extraction and merge pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct ExtractionPolicy {
    /// Key characters processed per chapter
    pub max_key_characters: usize,
    /// Character names embedded in the prompt roster
    pub roster_limit: usize,
    /// Chapter text characters embedded in the prompt
    pub prompt_chapter_chars: usize,
    /// Due chapter offset for quests making progress
    pub progress_due_offset: u32,
    /// Due chapter offset for stalled quests
    pub stalled_due_offset: u32,
    /// Strength used when no relation keyword matches
    pub default_relation_strength: f64,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            max_key_characters: 3,
            roster_limit: 50,
            prompt_chapter_chars: 12_000,
            progress_due_offset: 5,
            stalled_due_offset: 10,
            default_relation_strength: 0.5,
        }
    }
}

/// Policy for context assembly and token budgeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct BudgetPolicy {
    /// Chapters up to and including this number bypass filtering
    pub bypass_through_chapter: u32,
    /// Bypass when events + foreshadows + arcs total fewer than this
    pub bypass_min_candidates: usize,
    pub min_importance: f64,
    pub max_events: usize,
    pub max_foreshadows: usize,
    pub max_conflict_arcs: usize,
    pub max_character_arcs: usize,
    pub max_plotlines: usize,
    pub max_event_description_chars: usize,
    pub max_recent_chapters: usize,
    pub max_recent_chapter_chars: usize,
    pub max_summaries: usize,
    pub max_characters: usize,
    pub max_relationships: usize,
    pub max_event_highlights: usize,
    pub max_plotline_alerts: usize,
    pub max_quest_alerts: usize,
    /// Chapters without activity before a plotline raises an alert
    pub plotline_idle_chapters: u32,
    /// Token budget for rendering the optimized context
    pub token_budget: i32,
    /// Per-kind row limit when loading candidates from the store
    pub candidate_fetch_limit: usize,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            bypass_through_chapter: 5,
            bypass_min_candidates: 3,
            min_importance: 0.35,
            max_events: 8,
            max_foreshadows: 5,
            max_conflict_arcs: 3,
            max_character_arcs: 3,
            max_plotlines: 4,
            max_event_description_chars: 200,
            max_recent_chapters: 3,
            max_recent_chapter_chars: 3_000,
            max_summaries: 10,
            max_characters: 12,
            max_relationships: 10,
            max_event_highlights: 3,
            max_plotline_alerts: 2,
            max_quest_alerts: 2,
            plotline_idle_chapters: 10,
            token_budget: 8_000,
            candidate_fetch_limit: 50,
        }
    }
}

/// Policy for volume range planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct PlannerPolicy {
    pub default_volume_count: u32,
    pub default_chapters_per_volume: u32,
    pub min_buffer_chapters: u32,
    /// Buffer as a fraction of the volume span
    pub buffer_ratio: f64,
    /// Persisted spans shorter than this fraction of the expected span are ignored
    pub min_plausible_span_ratio: f64,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            default_volume_count: 5,
            default_chapters_per_volume: 100,
            min_buffer_chapters: 5,
            buffer_ratio: 0.10,
            min_plausible_span_ratio: 0.6,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct ChronicleConfig {
    pub extraction: ExtractionPolicy,
    pub budget: BudgetPolicy,
    pub planner: PlannerPolicy,
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ChronicleError {
    ChronicleError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

fn require_positive(field: &str, value: usize) -> ChronicleResult<()> {
    if value == 0 {
        return Err(invalid(field, value, "must be greater than 0"));
    }
    Ok(())
}

fn require_unit(field: &str, value: f64) -> ChronicleResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, value, "must be between 0.0 and 1.0"));
    }
    Ok(())
}

impl ChronicleConfig {
    /// The documented default policies for all three engines.
    pub fn default_policies() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every cap and limit is > 0
    /// - thresholds and strengths are within [0.0, 1.0]
    /// - buffer_ratio is within (0.0, 1.0]
    /// - stalled quests are not due sooner than progressing ones
    pub fn validate(&self) -> ChronicleResult<()> {
        let e = &self.extraction;
        require_positive("extraction.max_key_characters", e.max_key_characters)?;
        require_positive("extraction.prompt_chapter_chars", e.prompt_chapter_chars)?;
        require_unit("extraction.default_relation_strength", e.default_relation_strength)?;
        if e.progress_due_offset == 0 {
            return Err(invalid(
                "extraction.progress_due_offset",
                e.progress_due_offset,
                "must be greater than 0",
            ));
        }
        if e.stalled_due_offset < e.progress_due_offset {
            return Err(invalid(
                "extraction.stalled_due_offset",
                e.stalled_due_offset,
                "must not be less than progress_due_offset",
            ));
        }

        let b = &self.budget;
        require_unit("budget.min_importance", b.min_importance)?;
        for (field, value) in [
            ("budget.max_events", b.max_events),
            ("budget.max_foreshadows", b.max_foreshadows),
            ("budget.max_conflict_arcs", b.max_conflict_arcs),
            ("budget.max_character_arcs", b.max_character_arcs),
            ("budget.max_plotlines", b.max_plotlines),
            ("budget.max_event_description_chars", b.max_event_description_chars),
            ("budget.max_recent_chapter_chars", b.max_recent_chapter_chars),
            ("budget.candidate_fetch_limit", b.candidate_fetch_limit),
        ] {
            require_positive(field, value)?;
        }
        if b.token_budget <= 0 {
            return Err(invalid(
                "budget.token_budget",
                b.token_budget,
                "token_budget must be greater than 0",
            ));
        }

        let p = &self.planner;
        if p.default_volume_count == 0 {
            return Err(invalid(
                "planner.default_volume_count",
                p.default_volume_count,
                "must be greater than 0",
            ));
        }
        if p.default_chapters_per_volume == 0 {
            return Err(invalid(
                "planner.default_chapters_per_volume",
                p.default_chapters_per_volume,
                "must be greater than 0",
            ));
        }
        if !(p.buffer_ratio > 0.0 && p.buffer_ratio <= 1.0) {
            return Err(invalid(
                "planner.buffer_ratio",
                p.buffer_ratio,
                "must be within (0.0, 1.0]",
            ));
        }
        require_unit("planner.min_plausible_span_ratio", p.min_plausible_span_ratio)?;

        Ok(())
    }

    /// Load a TOML file. Missing sections and fields take their defaults.
    pub fn from_path(path: &Path) -> ChronicleResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: ChronicleConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load from `CHRONICLE_CONFIG` when set (defaults otherwise), apply
    /// `CHRONICLE_*` environment overrides, then validate.
    pub fn load() -> ChronicleResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(Path::new(path.trim()))?,
            _ => Self::default_policies(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// Environment variables:
    /// - `CHRONICLE_BUDGET_MIN_IMPORTANCE`
    /// - `CHRONICLE_BUDGET_MAX_EVENTS`
    /// - `CHRONICLE_BUDGET_MAX_FORESHADOWS`
    /// - `CHRONICLE_BUDGET_MAX_PLOTLINES`
    /// - `CHRONICLE_BUDGET_MAX_SUMMARIES`
    /// - `CHRONICLE_BUDGET_TOKEN_BUDGET`
    /// - `CHRONICLE_EXTRACTION_MAX_KEY_CHARACTERS`
    /// - `CHRONICLE_PLANNER_DEFAULT_VOLUME_COUNT`
    /// - `CHRONICLE_PLANNER_DEFAULT_CHAPTERS_PER_VOLUME`
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr, F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }

        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_MIN_IMPORTANCE") {
            self.budget.min_importance = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_MAX_EVENTS") {
            self.budget.max_events = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_MAX_FORESHADOWS") {
            self.budget.max_foreshadows = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_MAX_PLOTLINES") {
            self.budget.max_plotlines = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_MAX_SUMMARIES") {
            self.budget.max_summaries = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_BUDGET_TOKEN_BUDGET") {
            self.budget.token_budget = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_EXTRACTION_MAX_KEY_CHARACTERS") {
            self.extraction.max_key_characters = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_PLANNER_DEFAULT_VOLUME_COUNT") {
            self.planner.default_volume_count = v;
        }
        if let Some(v) = parsed(&lookup, "CHRONICLE_PLANNER_DEFAULT_CHAPTERS_PER_VOLUME") {
            self.planner.default_chapters_per_volume = v;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
