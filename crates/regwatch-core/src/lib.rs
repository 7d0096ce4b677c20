//! # regwatch-core
//!
//! Deterministic building blocks of the regwatch compliance engine.
//!
//! This crate answers, without any network I/O:
//! - Which rules apply? ([`RuleSet`])
//! - Does a document contain a rule's trigger phrases? ([`PatternMatcher`])
//! - How do pattern and LLM judgments combine? ([`ComplianceVerdict::merge`])
//! - What does a batch of verdicts add up to? ([`summarize`])
//!
//! LLM adjudication, retrieval and orchestration live in `regwatch-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use regwatch_core::{LlmVerdict, ComplianceVerdict, PatternMatcher, RuleSet, summarize};
//!
//! let report = RuleSet::load_dir("rules")?;
//! let rule = report.rule_set.rule("HIPAA", "HIPAA-001").unwrap();
//! let hit = PatternMatcher::new().match_rule("We store the SSN in plaintext.", rule);
//! let verdict = ComplianceVerdict::merge("doc-1", rule, hit, LlmVerdict::not_configured());
//! println!("{}", regwatch_core::render_text(&summarize(&[verdict])));
//! ```

pub mod evidence;
pub mod matcher;
pub mod report;
pub mod response;
pub mod rules;
pub mod schema;
pub mod segmenter;
pub mod verdict;

// Re-export main types at crate root
pub use evidence::{PatternEvidence, CONTEXT_WINDOW_CHARS};
pub use matcher::{PatternMatch, PatternMatcher};
pub use report::{
    render_text, summarize, ComplianceReport, ReportStatus, ReportSummary,
    HIGH_CONFIDENCE_THRESHOLD,
};
pub use response::{parse_llm_response, ParseFailure};
pub use rules::{
    framework_name_from_path, FrameworkRules, Rule, RuleFileFailure, RuleLoadError,
    RuleLoadReport, RuleSet, Severity,
};
pub use segmenter::{
    chunk, chunk_spans, ChunkConfig, ConfigError, DocumentChunk, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};
pub use verdict::{ComplianceVerdict, LlmVerdict, PATTERN_CONFIDENCE_FLOOR};
