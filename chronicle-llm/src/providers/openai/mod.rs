//! OpenAI-compatible provider
//!
//! Works against OpenAI and any server exposing `/chat/completions`.

pub mod client;
pub mod generator;
pub mod types;

pub use client::OpenAiClient;
pub use generator::{OpenAiCompatibleGenerator, OpenAiSettings};
