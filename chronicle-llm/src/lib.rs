//! Chronicle LLM - Text Generation Layer
//!
//! Provider-agnostic trait for the single-shot text generation call the
//! extraction engine depends on, plus a registry and a concrete
//! OpenAI-compatible provider.

pub mod providers;

pub use providers::openai::{OpenAiClient, OpenAiCompatibleGenerator, OpenAiSettings};

use async_trait::async_trait;
use chronicle_core::{ChronicleError, ChronicleResult, LlmError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// ============================================================================
// TEXT GENERATOR TRAIT
// ============================================================================

/// Configuration for a single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens in the generated output
    pub max_tokens: i32,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional system instruction sent ahead of the prompt
    pub system_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2_000,
            temperature: 0.2,
            system_prompt: None,
        }
    }
}

impl GenerationConfig {
    /// Low-temperature settings for structured extraction output.
    pub fn structured(system_prompt: impl Into<String>) -> Self {
        Self {
            max_tokens: 2_000,
            temperature: 0.1,
            system_prompt: Some(system_prompt.into()),
        }
    }
}

/// Trait for text generation providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// The engine treats the output as untrusted text: it may be well-formed
/// structured content or noise.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`.
    ///
    /// # Returns
    /// * `Ok(String)` - The raw generated text
    /// * `Err(ChronicleError::Llm)` - If the provider call fails
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> ChronicleResult<String>;

    /// Short provider name used in logs and errors.
    fn provider_name(&self) -> &str;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry holding the configured text generator.
///
/// # Example
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// registry.register_generator(Arc::new(OpenAiCompatibleGenerator::from_env()?));
/// let text = registry.generator()?.generate("hello", &GenerationConfig::default()).await?;
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a text generator, replacing any previous one.
    pub fn register_generator(&mut self, generator: Arc<dyn TextGenerator>) {
        self.generator = Some(generator);
    }

    /// Get the registered text generator.
    ///
    /// # Returns
    /// * `Err(ChronicleError::Llm(LlmError::ProviderNotConfigured))` - If none registered
    pub fn generator(&self) -> ChronicleResult<Arc<dyn TextGenerator>> {
        self.generator
            .clone()
            .ok_or(ChronicleError::Llm(LlmError::ProviderNotConfigured))
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn clear_generator(&mut self) {
        self.generator = None;
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "generator",
                &self.generator.as_ref().map(|g| g.provider_name().to_string()),
            )
            .finish()
    }
}

// ============================================================================
// USAGE TRACKER
// ============================================================================

/// Tracks token usage across generation calls.
/// Thread-safe via atomic operations.
#[derive(Debug, Default)]
pub struct UsageTracker {
    requests: AtomicI64,
    prompt_tokens: AtomicI64,
    completion_tokens: AtomicI64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request.
    pub fn record(&self, prompt_tokens: i64, completion_tokens: i64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
    }

    pub fn requests(&self) -> i64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn prompt_tokens(&self) -> i64 {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn completion_tokens(&self) -> i64 {
        self.completion_tokens.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.prompt_tokens.store(0, Ordering::Relaxed);
        self.completion_tokens.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// TESTS
// ============================================================================
