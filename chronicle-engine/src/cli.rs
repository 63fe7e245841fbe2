//! Command handling for the `chronicle` binary.

use chronicle_context::{render_context, ContextAssembler, ContextCandidates, ContextWindow, OptimizedContext};
use chronicle_core::{
    new_novel_id, ChapterNumber, ChronicleConfig, ChronicleResult, NovelId, PlanningSettings,
    ValidationError, VolumeRecord,
};
use chronicle_planner::plan_volume;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const USAGE: &str = "\
Usage:
  chronicle plan <volumes.json> <chapter>
  chronicle assemble <candidates.json> <chapter>

Configuration is read from CHRONICLE_CONFIG (TOML) and CHRONICLE_* overrides.";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Plan { input: PathBuf, chapter: ChapterNumber },
    Assemble { input: PathBuf, chapter: ChapterNumber },
}

/// Input for `plan`: persisted volumes and optional planning settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanInput {
    #[serde(default)]
    pub volumes: Vec<VolumeRecord>,
    #[serde(default)]
    pub settings: PlanningSettings,
}

/// Input for `assemble`: candidate lists, optionally tagged with a novel.
#[derive(Debug, Clone, Deserialize)]
pub struct AssembleInput {
    #[serde(default = "new_novel_id")]
    pub novel_id: NovelId,
    #[serde(flatten)]
    pub candidates: ContextCandidates,
}

#[derive(Debug, Serialize)]
struct AssembleOutput {
    context: OptimizedContext,
    window: ContextWindow,
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Parse arguments, without the program name.
pub fn parse_args(args: &[String]) -> ChronicleResult<Command> {
    let [name, input, chapter] = args else {
        return Err(invalid("arguments", format!("expected 3 arguments, got {}", args.len())).into());
    };
    let chapter: ChapterNumber = chapter
        .trim()
        .parse()
        .map_err(|_| invalid("chapter", format!("'{}' is not a chapter number", chapter)))?;
    if chapter == 0 {
        return Err(invalid("chapter", "chapters start at 1").into());
    }
    let input = PathBuf::from(input);
    match name.as_str() {
        "plan" => Ok(Command::Plan { input, chapter }),
        "assemble" => Ok(Command::Assemble { input, chapter }),
        other => Err(invalid("command", format!("unknown command '{}'", other)).into()),
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> ChronicleResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| invalid("input", format!("cannot read {}: {}", path.display(), e)))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| invalid("input", format!("{} is not valid input: {}", path.display(), e)))?;
    Ok(value)
}

fn to_json<T: Serialize>(value: &T) -> ChronicleResult<String> {
    Ok(serde_json::to_string_pretty(value).map_err(|e| invalid("output", e.to_string()))?)
}

/// Run a command and return its JSON output.
pub fn run(command: &Command, config: &ChronicleConfig) -> ChronicleResult<String> {
    match command {
        Command::Plan { input, chapter } => {
            let plan: PlanInput = read_json(input)?;
            debug!(volumes = plan.volumes.len(), chapter, "planning");
            let lookup = plan_volume(&plan.volumes, &plan.settings, *chapter, &config.planner);
            to_json(&lookup)
        }
        Command::Assemble { input, chapter } => {
            let request: AssembleInput = read_json(input)?;
            let context = ContextAssembler::new(config.budget.clone()).assemble(
                request.novel_id,
                *chapter,
                request.candidates,
            );
            let window = render_context(&context, config.budget.token_budget);
            to_json(&AssembleOutput { context, window })
        }
    }
}
