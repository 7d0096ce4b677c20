//! Verdict records.
//!
//! An [`LlmVerdict`] is the adjudicator's judgment for one (document, rule)
//! pair. A [`ComplianceVerdict`] merges it with the deterministic pattern
//! scan and is the engine's principal output unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::PatternEvidence;
use crate::matcher::PatternMatch;
use crate::rules::{Rule, Severity};

/// Confidence assigned to any pattern hit.
pub const PATTERN_CONFIDENCE_FLOOR: f64 = 0.8;

/// Explanation used when no LLM backend is configured.
pub const NOT_CONFIGURED_EXPLANATION: &str = "No LLM API configured";

/// Structured judgment returned by the LLM adjudicator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmVerdict {
    pub violation: bool,

    /// In `[0, 1]`
    pub confidence: f64,

    /// Quotes from the document supporting the judgment
    #[serde(default)]
    pub evidence: Vec<String>,

    #[serde(default)]
    pub explanation: String,
}

impl LlmVerdict {
    /// Degraded mode: no backend to ask.
    pub fn not_configured() -> Self {
        Self {
            violation: false,
            confidence: 0.0,
            evidence: Vec::new(),
            explanation: NOT_CONFIGURED_EXPLANATION.to_string(),
        }
    }

    /// The backend could not be reached or returned an error.
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self {
            violation: false,
            confidence: 0.0,
            evidence: Vec::new(),
            explanation: format!("LLM analysis failed: {}", cause),
        }
    }

    /// The backend answered, but not in the expected shape.
    ///
    /// Flagged as a possible violation at medium confidence so the rule is
    /// reviewed rather than silently passed.
    pub fn unparsable(raw: impl Into<String>) -> Self {
        Self {
            violation: true,
            confidence: 0.5,
            evidence: Vec::new(),
            explanation: raw.into(),
        }
    }
}

/// Merged pattern + LLM outcome for one (document, rule) pair.
///
/// Immutable once built. `overall_violation` is `pattern_hit || llm_violation`
/// and `confidence_score` never drops below [`PATTERN_CONFIDENCE_FLOOR`] when
/// a pattern hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceVerdict {
    pub document_id: String,
    pub framework: String,
    pub rule_id: String,
    pub rule_name: String,
    pub description: String,
    pub severity: Severity,

    pub pattern_hit: bool,
    pub pattern_evidence: Vec<PatternEvidence>,

    pub llm_violation: bool,
    pub llm_confidence: f64,
    pub llm_evidence: Vec<String>,
    pub llm_explanation: String,

    pub overall_violation: bool,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ComplianceVerdict {
    /// Combine the pattern scan and the LLM judgment for `rule`.
    pub fn merge(
        document_id: impl Into<String>,
        rule: &Rule,
        patterns: PatternMatch,
        llm: LlmVerdict,
    ) -> Self {
        let pattern_confidence = if patterns.hit {
            PATTERN_CONFIDENCE_FLOOR
        } else {
            0.0
        };

        Self {
            document_id: document_id.into(),
            framework: rule.framework.clone(),
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            description: rule.description.clone(),
            severity: rule.severity,
            overall_violation: patterns.hit || llm.violation,
            confidence_score: pattern_confidence.max(llm.confidence),
            pattern_hit: patterns.hit,
            pattern_evidence: patterns.evidence,
            llm_violation: llm.violation,
            llm_confidence: llm.confidence,
            llm_evidence: llm.evidence,
            llm_explanation: llm.explanation,
            created_at: Utc::now(),
        }
    }
}
