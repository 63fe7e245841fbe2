//! Text generation provider implementations

pub mod openai;

use chronicle_core::{ChronicleError, LlmError};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> ChronicleError {
    ChronicleError::Llm(LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> ChronicleError {
    ChronicleError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ChronicleError {
    ChronicleError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

pub(crate) fn empty_response(provider: &str) -> ChronicleError {
    ChronicleError::Llm(LlmError::EmptyResponse {
        provider: provider.to_string(),
    })
}
