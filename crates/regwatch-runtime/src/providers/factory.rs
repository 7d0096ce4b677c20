//! Construction-time backend selection.
//!
//! The set of backends is closed: [`ProviderKind`] names every variant, and
//! the choice is made once when the engine is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use super::secrets::ApiCredential;
use super::{LlmProvider, ProviderError};
use crate::config::LlmSettings;

/// A supported LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Environment variable carrying the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn credential_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI API key",
            ProviderKind::Anthropic => "Anthropic API key",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend the engine should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    /// OpenAI if its key is set, else Anthropic if its key is set, else none
    #[default]
    Auto,

    /// Run without a backend
    #[serde(rename = "none")]
    Disabled,

    #[serde(rename = "openai")]
    OpenAi,

    Anthropic,
}

impl FromStr for ProviderSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(ProviderSelection::Auto),
            "none" | "off" | "disabled" => Ok(ProviderSelection::Disabled),
            "openai" => Ok(ProviderSelection::OpenAi),
            "anthropic" => Ok(ProviderSelection::Anthropic),
            other => Err(format!(
                "Unknown LLM provider '{}': expected openai, anthropic, auto or none",
                other
            )),
        }
    }
}

/// Build a backend of `kind` with the given credential.
#[allow(unused_variables)]
pub fn build_provider(
    kind: ProviderKind,
    credential: ApiCredential,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    match kind {
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => {
            let mut provider = super::OpenAiProvider::with_credential(credential);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => {
            let mut provider = super::AnthropicProvider::with_credential(credential);
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Ok(Arc::new(provider))
        }
        #[allow(unreachable_patterns)]
        other => Err(ProviderError::NotConfigured(format!(
            "{} backend requires the '{}' feature",
            other, other
        ))),
    }
}

/// Pick and build the backend described by `settings` from the process environment.
pub fn select_provider(
    settings: &LlmSettings,
) -> Result<Option<Arc<dyn LlmProvider>>, ProviderError> {
    select_provider_with(settings, |key| std::env::var(key).ok())
}

/// Pick and build a backend, reading credentials through `lookup`.
///
/// `Ok(None)` is the degraded no-backend mode. An explicitly requested
/// backend without a credential is an error.
pub fn select_provider_with(
    settings: &LlmSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<Arc<dyn LlmProvider>>, ProviderError> {
    let has_key = |kind: ProviderKind| {
        lookup(kind.api_key_env()).is_some_and(|v| !v.trim().is_empty())
    };

    let kind = match settings.provider {
        ProviderSelection::Disabled => None,
        ProviderSelection::OpenAi => Some(ProviderKind::OpenAi),
        ProviderSelection::Anthropic => Some(ProviderKind::Anthropic),
        ProviderSelection::Auto => [ProviderKind::OpenAi, ProviderKind::Anthropic]
            .into_iter()
            .find(|k| has_key(*k)),
    };

    let Some(kind) = kind else {
        info!("No LLM backend configured, running pattern-only analysis");
        return Ok(None);
    };

    let credential = ApiCredential::from_lookup(&lookup, kind.api_key_env(), kind.credential_name())?;
    let provider = build_provider(kind, credential, settings.base_url.as_deref())?;
    info!(provider = %kind, "Selected LLM backend");
    Ok(Some(provider))
}
