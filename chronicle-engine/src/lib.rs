//! Chronicle Engine - Narrative Continuity Facade
//!
//! Ties the extraction, context and planning engines to a store and a text
//! generator. Extraction for one novel is serialized; reads are not.

pub mod cli;
pub mod engine;
pub mod telemetry;

pub use engine::{ChapterPreparation, ContinuityEngine, RegenerationReport};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
