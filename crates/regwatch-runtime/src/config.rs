//! Engine configuration.
//!
//! Loaded from YAML and then overridden from the environment. Every field
//! has a default, so an empty file (or no file) is a valid configuration.
//!
//! ```yaml
//! rules_dir: rules
//! chunking: { size: 1000, overlap: 200 }
//! llm:
//!   provider: auto        # auto | openai | anthropic | none
//!   timeout: 30s
//!   max_retries: 2
//! retrieval:
//!   enabled: true
//!   top_k: 3
//!   max_documents: 64
//!   model_dir: models/all-MiniLM-L6-v2   # needs the `onnx` feature

//! circuit_breaker: { failure_threshold: 3, recovery_timeout: 30s }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use regwatch_core::{ChunkConfig, ConfigError, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

use crate::providers::ProviderSelection;
use crate::resilience::CircuitBreakerConfig;

pub const ENV_LLM_PROVIDER: &str = "REGWATCH_LLM_PROVIDER";
pub const ENV_LLM_MODEL: &str = "REGWATCH_LLM_MODEL";
pub const ENV_RULES_DIR: &str = "REGWATCH_RULES_DIR";
pub const ENV_EMBEDDING_MODEL_DIR: &str = "REGWATCH_EMBEDDING_MODEL_DIR";

/// Errors reading engine settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of `*_rules.json` files
    pub rules_dir: PathBuf,

    pub chunking: ChunkingSettings,

    pub llm: LlmSettings,

    pub retrieval: RetrievalSettings,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from("rules"),
            chunking: ChunkingSettings::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Apply `REGWATCH_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, SettingsError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `REGWATCH_*` overrides read through `lookup`.
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        if let Some(provider) = lookup(ENV_LLM_PROVIDER) {
            self.llm.provider = provider
                .parse()
                .map_err(|message| SettingsError::InvalidValue {
                    key: ENV_LLM_PROVIDER,
                    message,
                })?;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|m| !m.trim().is_empty()) {
            self.llm.model = Some(model);
        }
        if let Some(dir) = lookup(ENV_RULES_DIR).filter(|d| !d.trim().is_empty()) {
            self.rules_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_EMBEDDING_MODEL_DIR).filter(|d| !d.trim().is_empty()) {
            self.retrieval.model_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    /// Validated chunking parameters.
    pub fn chunk_config(&self) -> Result<ChunkConfig, ConfigError> {
        ChunkConfig::new(self.chunking.size, self.chunking.overlap)
    }
}

/// Segmenter window size and overlap, in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSettings {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// LLM backend selection and call parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: ProviderSelection,

    /// Model override; each backend has its own default
    pub model: Option<String>,

    pub max_tokens: u32,

    pub temperature: f32,

    /// Bound on one backend call
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Retries after the first attempt, for transient failures only
    pub max_retries: usize,

    /// First retry delay; later delays grow exponentially with jitter
    #[serde(with = "humantime_duration")]
    pub retry_delay: Duration,

    /// Document characters included in the prompt
    pub content_prefix_chars: usize,

    /// LLM calls in flight per analysis
    pub max_concurrent_calls: usize,

    /// Alternative endpoint for the selected backend
    pub base_url: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderSelection::Auto,
            model: None,
            max_tokens: 1000,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            content_prefix_chars: 3000,
            max_concurrent_calls: 1,
            base_url: None,
        }
    }
}

/// Semantic retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub enabled: bool,

    /// Passages added to each prompt
    pub top_k: usize,

    /// Documents kept in the index; 0 keeps everything
    pub max_documents: usize,

    /// Directory with a sentence-transformers `model.onnx` and
    /// `tokenizer.json`; the hashing embedder is used when unset
    pub model_dir: Option<PathBuf>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            max_documents: 64,
            model_dir: None,
        }
    }
}

/// Serde adapter for human-readable durations such as `"30s"` or `"1m 30s"`.
pub(crate) mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.rules_dir, PathBuf::from("rules"));
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.llm.provider, ProviderSelection::Auto);
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.llm.timeout, Duration::from_secs(30));
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.llm.content_prefix_chars, 3000);
        assert_eq!(config.llm.max_concurrent_calls, 1);
        assert!(config.retrieval.enabled);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.max_documents, 64);
        assert!(config.retrieval.model_dir.is_none());
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
rules_dir: /etc/regwatch/rules
llm:
  provider: none
  timeout: 1m 30s
  max_concurrent_calls: 4
circuit_breaker:
  recovery_timeout: 10s
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rules_dir, PathBuf::from("/etc/regwatch/rules"));
        assert_eq!(config.llm.provider, ProviderSelection::Disabled);
        assert_eq!(config.llm.timeout, Duration::from_secs(90));
        assert_eq!(config.llm.max_concurrent_calls, 4);
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(10));
        assert_eq!(config.chunking, ChunkingSettings::default());
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let yaml = "llm:\n  timeout: soon\n";
        assert!(matches!(EngineConfig::from_yaml(yaml), Err(SettingsError::Yaml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_LLM_PROVIDER, "anthropic"),
            (ENV_LLM_MODEL, "claude-3-haiku-20240307"),
            (ENV_RULES_DIR, "/tmp/rules"),
            (ENV_EMBEDDING_MODEL_DIR, "/opt/models/all-MiniLM-L6-v2"),
        ]
        .into();
        let config = EngineConfig::default()
            .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.llm.provider, ProviderSelection::Anthropic);
        assert_eq!(config.llm.model.as_deref(), Some("claude-3-haiku-20240307"));
        assert_eq!(config.rules_dir, PathBuf::from("/tmp/rules"));
        assert_eq!(
            config.retrieval.model_dir,
            Some(PathBuf::from("/opt/models/all-MiniLM-L6-v2"))
        );
    }

    #[test]
    fn test_retrieval_yaml() {
        let yaml = "retrieval:\n  max_documents: 0\n  model_dir: /srv/minilm\n";
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retrieval.max_documents, 0);
        assert_eq!(config.retrieval.model_dir, Some(PathBuf::from("/srv/minilm")));
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn test_invalid_provider_override() {
        let result = EngineConfig::default()
            .with_overrides_from(|k| (k == ENV_LLM_PROVIDER).then(|| "gemini".to_string()));
        assert!(matches!(
            result,
            Err(SettingsError::InvalidValue { key: ENV_LLM_PROVIDER, .. })
        ));
    }

    #[test]
    fn test_chunk_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.chunk_config().is_ok());
        config.chunking.overlap = config.chunking.size;
        assert!(matches!(
            config.chunk_config(),
            Err(ConfigError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn test_yaml_round_trip_keeps_durations_readable() {
        let yaml = serde_yaml::to_string(&EngineConfig::default()).unwrap();
        assert!(yaml.contains("timeout: 30s"));
    }
}
