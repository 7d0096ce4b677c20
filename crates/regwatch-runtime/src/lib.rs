//! # regwatch-runtime
//!
//! Everything in regwatch that talks to a backend: LLM adjudication,
//! semantic retrieval and the [`ComplianceEngine`] that drives them.
//!
//! The deterministic pieces (rules, pattern matching, merging, reporting)
//! live in `regwatch-core`. Analysis never fails: backend errors, timeouts
//! and unparsable answers all become well-formed verdicts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use regwatch_runtime::{ComplianceEngine, EngineConfig};
//!
//! let config = EngineConfig::from_yaml_file("regwatch.yaml")?.with_env_overrides()?;
//! let engine = ComplianceEngine::from_config(&config)?;
//!
//! let verdicts = engine.analyze_document("policy-7", &text, None).await;
//! let report = engine.generate_compliance_report(&verdicts);
//! ```

pub mod adjudicator;
pub mod config;
pub mod engine;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;

pub use adjudicator::{Adjudicator, AdjudicatorConfig};
pub use config::{
    ChunkingSettings, EngineConfig, LlmSettings, RetrievalSettings, SettingsError,
};
pub use engine::{ComplianceEngine, ComplianceEngineBuilder, EngineError};
pub use providers::{
    CompletionConfig, CompletionResponse, LlmProvider, ProviderError, ProviderKind,
    ProviderSelection, TokenUsage,
};
pub use resilience::{CircuitBreakerConfig, LlmUsage, RetryPolicy};
pub use retrieval::{
    build_embedder, Embedder, HashingEmbedder, InMemoryVectorIndex, RetrievalError,
    SemanticRetriever, VectorIndex,
};
#[cfg(feature = "onnx")]
pub use retrieval::OnnxEmbedder;
