//! Analysis orchestration.
//!
//! [`ComplianceEngine`] runs every selected rule against a document:
//! - Pattern scan (deterministic, in-process)
//! - LLM adjudication, optionally with retrieved passages as context
//! - Merge into one [`ComplianceVerdict`] per rule
//!
//! The engine holds no global state; each instance owns its rules, backend
//! and index.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use regwatch_core::{
    summarize, ComplianceReport, ComplianceVerdict, ConfigError, PatternMatcher,
    Rule, RuleLoadError, RuleSet,
};

use crate::adjudicator::{Adjudicator, AdjudicatorConfig};
use crate::config::{EngineConfig, SettingsError};
use crate::providers::{select_provider, LlmProvider, ProviderError};
use crate::resilience::LlmUsage;
use crate::retrieval::{Metadata, RetrievalError, SemanticRetriever};

/// Errors building an engine. Analysis itself never fails.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load rules: {0}")]
    RuleLoad(#[from] RuleLoadError),

    #[error("Invalid chunking: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Semantic retrieval: {0}")]
    Retrieval(#[from] RetrievalError),
}

/// Compliance analysis engine.
pub struct ComplianceEngine {
    rules: RuleSet,
    matcher: PatternMatcher,
    adjudicator: Adjudicator,
    retriever: Option<Arc<SemanticRetriever>>,
    config: EngineConfig,
}

impl ComplianceEngine {
    pub fn builder() -> ComplianceEngineBuilder {
        ComplianceEngineBuilder::new()
    }

    /// Engine wired from configuration.
    ///
    /// Loads `rules_dir` (files that fail to load are skipped with a warning),
    /// selects the LLM backend from the environment and, if enabled, an
    /// in-memory retriever with the configured embedder and capacity.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let report = RuleSet::load_dir(&config.rules_dir)?;
        for failure in &report.failures {
            warn!(
                path = %failure.path.display(),
                error = %failure.error,
                "Rule file not loaded"
            );
        }

        let provider = select_provider(&config.llm)?;
        let mut builder = Self::builder()
            .rules(report.rule_set)
            .config(config.clone());
        if let Some(provider) = provider {
            builder = builder.provider(provider);
        }
        if config.retrieval.enabled {
            let retriever = SemanticRetriever::from_settings(&config.retrieval, config.chunk_config()?)?;
            builder = builder.retriever(Arc::new(retriever));
        }
        builder.build()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the configured LLM backend, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.adjudicator.provider_name()
    }

    pub fn retriever(&self) -> Option<&Arc<SemanticRetriever>> {
        self.retriever.as_ref()
    }

    /// LLM usage accumulated by this engine.
    pub fn usage(&self) -> LlmUsage {
        self.adjudicator.usage()
    }

    /// Analyze a document against the selected frameworks.
    ///
    /// `frameworks` defaults to every loaded framework. Names are matched
    /// case-insensitively; unknown names are skipped. Verdicts come back in
    /// rule order, one per rule.
    pub async fn analyze_document(
        &self,
        document_id: &str,
        content: &str,
        frameworks: Option<&[String]>,
    ) -> Vec<ComplianceVerdict> {
        let rules = self.select_rules(frameworks);
        info!(document_id, rules = rules.len(), "Analyzing document");

        if let Some(retriever) = &self.retriever {
            let metadata = Metadata::from([
                ("document_id".to_string(), document_id.to_string()),
                ("indexed_by".to_string(), "analyze_document".to_string()),
            ]);
            retriever.index_document(document_id, content, &metadata).await;
        }

        let concurrency = self.config.llm.max_concurrent_calls.max(1);
        let verdicts: Vec<ComplianceVerdict> = stream::iter(rules)
            .map(|rule| self.evaluate_rule(document_id, content, rule))
            .buffered(concurrency)
            .collect()
            .await;

        info!(
            document_id,
            checks = verdicts.len(),
            violations = verdicts.iter().filter(|v| v.overall_violation).count(),
            "Analysis finished"
        );
        verdicts
    }

    /// Summarize verdicts from one or more analyses.
    pub fn generate_compliance_report(&self, verdicts: &[ComplianceVerdict]) -> ComplianceReport {
        summarize(verdicts)
    }

    fn select_rules(&self, frameworks: Option<&[String]>) -> Vec<&Rule> {
        let Some(requested) = frameworks else {
            return self.rules.iter().flat_map(|f| f.rules.iter()).collect();
        };

        let mut names: Vec<String> = Vec::new();
        for name in requested {
            let name = name.trim().to_uppercase();
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
            .iter()
            .filter_map(|name| match self.rules.get(name) {
                Some(framework) => Some(framework),
                None => {
                    debug!(framework = %name, "Unknown framework, skipping");
                    None
                }
            })
            .flat_map(|f| f.rules.iter())
            .collect()
    }

    async fn evaluate_rule(&self, document_id: &str, content: &str, rule: &Rule) -> ComplianceVerdict {
        let patterns = self.matcher.match_rule(content, rule);

        let passages = match &self.retriever {
            Some(retriever) if self.config.retrieval.top_k > 0 => {
                let query = format!("{} {}", rule.name, rule.description);
                retriever
                    .relevant_passages_in(Some(document_id), &query, self.config.retrieval.top_k)
                    .await
            }
            _ => Vec::new(),
        };

        let llm = self.adjudicator.adjudicate(content, rule, &passages).await;
        let verdict = ComplianceVerdict::merge(document_id, rule, patterns, llm);
        debug!(
            document_id,
            rule_id = %rule.id,
            pattern_hit = verdict.pattern_hit,
            llm_violation = verdict.llm_violation,
            confidence = verdict.confidence_score,
            "Rule evaluated"
        );
        verdict
    }
}

/// Builder for [`ComplianceEngine`].
pub struct ComplianceEngineBuilder {
    rules: RuleSet,
    provider: Option<Arc<dyn LlmProvider>>,
    retriever: Option<Arc<SemanticRetriever>>,
    config: EngineConfig,
}

impl ComplianceEngineBuilder {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::new(),
            provider: None,
            retriever: None,
            config: EngineConfig::default(),
        }
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Set the LLM backend. Without one every rule gets the "not configured" verdict.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn retriever(mut self, retriever: Arc<SemanticRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine, validating the chunking settings.
    pub fn build(self) -> Result<ComplianceEngine, EngineError> {
        self.config.chunk_config()?;
        let adjudicator = Adjudicator::new(
            self.provider,
            AdjudicatorConfig::from_settings(&self.config.llm, &self.config.circuit_breaker),
        );
        let matcher = PatternMatcher::for_rules(&self.rules);

        Ok(ComplianceEngine {
            rules: self.rules,
            matcher,
            adjudicator,
            retriever: self.retriever,
            config: self.config,
        })
    }
}

impl Default for ComplianceEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::from_sources([
            (
                "GDPR",
                r#"{"rules": [{"id": "GDPR-001", "name": "Consent", "description": "Processing without consent", "patterns": ["without consent"]}]}"#,
            ),
            (
                "HIPAA",
                r#"{"rules": [{"id": "HIPAA-001", "name": "PHI", "description": "Unencrypted PHI", "patterns": ["unencrypted"]}]}"#,
            ),
        ])
        .unwrap()
    }

    fn engine() -> ComplianceEngine {
        ComplianceEngine::builder().rules(rules()).build().unwrap()
    }

    #[test]
    fn test_select_all_frameworks_in_order() {
        let engine = engine();
        let ids: Vec<&str> = engine.select_rules(None).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["GDPR-001", "HIPAA-001"]);
    }

    #[test]
    fn test_filter_is_case_insensitive_and_deduplicated() {
        let engine = engine();
        let filter = vec![
            "hipaa".to_string(),
            "HIPAA".to_string(),
            "unknown".to_string(),
            " gdpr ".to_string(),
        ];
        let ids: Vec<&str> = engine
            .select_rules(Some(filter.as_slice()))
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["HIPAA-001", "GDPR-001"]);
    }

    #[test]
    fn test_empty_filter_selects_nothing() {
        let engine = engine();
        assert!(engine.select_rules(Some(&[][..])).is_empty());
    }

    #[test]
    fn test_build_precompiles_rule_patterns() {
        assert_eq!(engine().matcher.compiled_patterns(), 2);
    }

    #[test]
    fn test_build_rejects_bad_chunking() {
        let mut config = EngineConfig::default();
        config.chunking.overlap = config.chunking.size;
        let err = ComplianceEngine::builder().config(config).build().err();
        assert!(matches!(err, Some(EngineError::Config(_))));
    }

    #[test]
    fn test_from_config_missing_rules_dir() {
        let config = EngineConfig {
            rules_dir: "/nonexistent/regwatch/rules".into(),
            ..Default::default()
        };
        let err = ComplianceEngine::from_config(&config).err();
        assert!(matches!(err, Some(EngineError::RuleLoad(RuleLoadError::IoError(_)))));
    }

    #[test]
    fn test_from_config_unloadable_embedding_model() {
        let rules_dir = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig {
            rules_dir: rules_dir.path().to_path_buf(),
            ..Default::default()
        };
        config.llm.provider = "none".parse().unwrap();
        config.retrieval.model_dir = Some(model_dir.path().to_path_buf());

        let err = ComplianceEngine::from_config(&config).err();
        assert!(matches!(err, Some(EngineError::Retrieval(RetrievalError::Model(_)))));

        config.retrieval.enabled = false;
        assert!(ComplianceEngine::from_config(&config).is_ok());
    }
}
