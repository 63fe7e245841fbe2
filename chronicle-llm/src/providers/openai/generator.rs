//! OpenAI-compatible text generator

use super::client::{OpenAiClient, DEFAULT_BASE_URL, PROVIDER};
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::{empty_response, invalid_response};
use crate::{GenerationConfig, TextGenerator, UsageTracker};
use async_trait::async_trait;
use chronicle_core::{ChronicleResult, ConfigError};
use serde::{Deserialize, Serialize};

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default request budget.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub requests_per_minute: u32,
}

impl OpenAiSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    /// Read settings from the process environment.
    ///
    /// Environment variables:
    /// - `CHRONICLE_LLM_API_KEY` (required)
    /// - `CHRONICLE_LLM_BASE_URL` (default: OpenAI)
    /// - `CHRONICLE_LLM_MODEL` (default: gpt-4o-mini)
    /// - `CHRONICLE_LLM_RPM` (default: 60)
    pub fn from_env() -> ChronicleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ChronicleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank("CHRONICLE_LLM_API_KEY").ok_or_else(|| ConfigError::MissingRequired {
            field: "CHRONICLE_LLM_API_KEY".to_string(),
        })?;
        let mut settings = Self::new(api_key.trim());

        if let Some(base_url) = non_blank("CHRONICLE_LLM_BASE_URL") {
            settings.base_url = base_url.trim().to_string();
        }
        if let Some(model) = non_blank("CHRONICLE_LLM_MODEL") {
            settings.model = model.trim().to_string();
        }
        if let Some(raw) = non_blank("CHRONICLE_LLM_RPM") {
            settings.requests_per_minute = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "CHRONICLE_LLM_RPM".to_string(),
                value: raw.clone(),
                reason: "must be a positive integer".to_string(),
            })?;
        }
        Ok(settings)
    }
}

/// Text generator backed by a `/chat/completions` endpoint.
pub struct OpenAiCompatibleGenerator {
    client: OpenAiClient,
    model: String,
    usage: UsageTracker,
}

impl OpenAiCompatibleGenerator {
    pub fn new(settings: OpenAiSettings) -> Self {
        Self {
            client: OpenAiClient::new(
                settings.api_key,
                settings.base_url,
                settings.requests_per_minute,
            ),
            model: settings.model,
            usage: UsageTracker::new(),
        }
    }

    /// Build from `CHRONICLE_LLM_*` environment variables.
    pub fn from_env() -> ChronicleResult<Self> {
        Ok(Self::new(OpenAiSettings::from_env()?))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    fn build_request(&self, prompt: &str, config: &GenerationConfig) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = config.system_prompt.as_deref() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> ChronicleResult<String> {
        let request = self.build_request(prompt, config);
        let response: CompletionResponse = self.client.request("chat/completions", &request).await?;

        if let Some(usage) = &response.usage {
            self.usage
                .record(usage.prompt_tokens, usage.completion_tokens.unwrap_or(0));
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response(PROVIDER, "No completion in response"))?;

        let text = choice.message.content.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(empty_response(PROVIDER));
        }
        tracing::debug!(
            model = %self.model,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            chars = text.len(),
            "generation completed"
        );
        Ok(text)
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleGenerator")
            .field("model", &self.model)
            .field("client", &self.client)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::ChronicleError;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key: &str| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_settings_require_api_key() {
        let err = OpenAiSettings::from_lookup(lookup(&[("CHRONICLE_LLM_MODEL", "m")])).unwrap_err();
        assert!(matches!(
            err,
            ChronicleError::Config(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let settings = OpenAiSettings::from_lookup(lookup(&[
            ("CHRONICLE_LLM_API_KEY", " sk-test "),
            ("CHRONICLE_LLM_BASE_URL", "http://localhost:11434/v1"),
            ("CHRONICLE_LLM_MODEL", ""),
        ]))
        .unwrap();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.requests_per_minute, DEFAULT_REQUESTS_PER_MINUTE);
    }

    #[test]
    fn test_settings_reject_bad_rpm() {
        let err = OpenAiSettings::from_lookup(lookup(&[
            ("CHRONICLE_LLM_API_KEY", "k"),
            ("CHRONICLE_LLM_RPM", "fast"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("CHRONICLE_LLM_RPM"));
    }

    #[test]
    fn test_settings_never_serialize_key() {
        let json = serde_json::to_string(&OpenAiSettings::new("sk-secret")).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_build_request_includes_system_prompt() {
        let generator = OpenAiCompatibleGenerator::new(OpenAiSettings::new("k"));
        let request =
            generator.build_request("chapter text", &GenerationConfig::structured("JSON only"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].content, "chapter text");
        assert_eq!(request.model, DEFAULT_MODEL);

        let plain = generator.build_request("p", &GenerationConfig::default());
        assert_eq!(plain.messages.len(), 1);
    }
}
