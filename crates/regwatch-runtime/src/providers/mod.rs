//! LLM backend abstractions for regwatch-runtime.
//!
//! A backend has one capability: given a prompt, return text. Anthropic and
//! OpenAI implementations are interchangeable behind [`LlmProvider`]; which
//! one is used is decided once, when the engine is built.
//!
//! ## Security
//!
//! All backends hold their API key in an [`ApiCredential`], which never
//! prints its value.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{
    build_provider, select_provider, select_provider_with, ProviderKind, ProviderSelection,
};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;

/// Errors from LLM backends.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

/// Parameters of a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    pub temperature: f32,

    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 1000,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,

    pub usage: TokenUsage,

    /// Model that served the request
    pub model: String,

    pub stop_reason: Option<String>,
}

impl CompletionResponse {
    /// A response carrying only text.
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            model: model.into(),
            stop_reason: None,
        }
    }
}

/// Token usage of a single completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A language-model backend.
///
/// Auth and endpoint are fixed at construction, never per call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a single user prompt.
    async fn complete(
        &self,
        prompt: &str,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Backend name for logs and circuit state.
    fn name(&self) -> &str;

    /// Model used when the configuration names none.
    fn default_model(&self) -> &str;
}
