//! Aggregation of verdicts into a compliance report.
//!
//! Pure functions over a verdict batch; no I/O.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::verdict::ComplianceVerdict;

/// Violations above this confidence count as high-confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Overall report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportStatus {
    #[serde(rename = "No violations found")]
    NoViolationsFound,

    #[serde(rename = "Analysis Complete")]
    AnalysisComplete,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::NoViolationsFound => "No violations found",
            ReportStatus::AnalysisComplete => "Analysis Complete",
        }
    }
}

/// Summary statistics over a non-empty verdict batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_checks: usize,
    pub total_violations: usize,

    /// Only frameworks with at least one violation appear
    pub violations_by_framework: BTreeMap<String, usize>,

    /// Only severities with at least one violation appear
    pub violations_by_severity: BTreeMap<String, usize>,

    pub high_confidence_violations: usize,

    /// Percentage of checks without a violation
    pub compliance_score: f64,
}

/// Aggregated outcome of one or more document analyses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub status: ReportStatus,

    /// `None` for an empty batch, serialized as `{}`
    #[serde(serialize_with = "serialize_summary")]
    pub summary: Option<ReportSummary>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub detailed_results: Vec<ComplianceVerdict>,
}

impl ComplianceReport {
    /// Verdicts that flagged a violation.
    pub fn violations(&self) -> impl Iterator<Item = &ComplianceVerdict> {
        self.detailed_results.iter().filter(|v| v.overall_violation)
    }

    pub fn has_violations(&self) -> bool {
        self.summary
            .as_ref()
            .is_some_and(|s| s.total_violations > 0)
    }
}

fn serialize_summary<S: Serializer>(
    summary: &Option<ReportSummary>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match summary {
        Some(summary) => summary.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// Summarize a batch of verdicts.
pub fn summarize(verdicts: &[ComplianceVerdict]) -> ComplianceReport {
    if verdicts.is_empty() {
        return ComplianceReport {
            status: ReportStatus::NoViolationsFound,
            summary: None,
            detailed_results: Vec::new(),
        };
    }

    let mut violations_by_framework = BTreeMap::new();
    let mut violations_by_severity = BTreeMap::new();
    let mut total_violations = 0;
    let mut high_confidence_violations = 0;

    for verdict in verdicts.iter().filter(|v| v.overall_violation) {
        total_violations += 1;
        *violations_by_framework
            .entry(verdict.framework.clone())
            .or_insert(0) += 1;
        *violations_by_severity
            .entry(verdict.severity.as_str().to_string())
            .or_insert(0) += 1;
        if verdict.confidence_score > HIGH_CONFIDENCE_THRESHOLD {
            high_confidence_violations += 1;
        }
    }

    let total_checks = verdicts.len();
    let compliance_score =
        100.0 * (total_checks - total_violations) as f64 / total_checks as f64;

    ComplianceReport {
        status: ReportStatus::AnalysisComplete,
        summary: Some(ReportSummary {
            total_checks,
            total_violations,
            violations_by_framework,
            violations_by_severity,
            high_confidence_violations,
            compliance_score,
        }),
        detailed_results: verdicts.to_vec(),
    }
}

/// Human-readable rendering of a report.
pub fn render_text(report: &ComplianceReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {}", report.status.as_str());

    let Some(summary) = &report.summary else {
        return out;
    };

    let _ = writeln!(out, "Compliance score: {:.1}%", summary.compliance_score);
    let _ = writeln!(
        out,
        "Checks: {}  Violations: {}  High confidence: {}",
        summary.total_checks, summary.total_violations, summary.high_confidence_violations
    );

    if !summary.violations_by_framework.is_empty() {
        let _ = writeln!(out, "\nBy framework:");
        for (framework, count) in &summary.violations_by_framework {
            let _ = writeln!(out, "  {:<10} {}", framework, count);
        }
    }

    if !summary.violations_by_severity.is_empty() {
        let _ = writeln!(out, "\nBy severity:");
        for (severity, count) in &summary.violations_by_severity {
            let _ = writeln!(out, "  {:<10} {}", severity, count);
        }
    }

    let mut violations = report.violations().peekable();
    if violations.peek().is_some() {
        let _ = writeln!(out, "\nViolations:");
    }
    for verdict in violations {
        let _ = writeln!(
            out,
            "  [{}] {} {} ({}) confidence {:.2}",
            verdict.severity, verdict.framework, verdict.rule_id, verdict.rule_name, verdict.confidence_score
        );
        for evidence in &verdict.pattern_evidence {
            let _ = writeln!(out, "      {}", evidence);
        }
        if verdict.llm_violation && !verdict.llm_explanation.is_empty() {
            let _ = writeln!(out, "      LLM: {}", verdict.llm_explanation);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::PatternMatch;
    use crate::rules::{Rule, Severity};
    use crate::verdict::LlmVerdict;
    use crate::PatternEvidence;
    use proptest::prelude::*;

    fn verdict(framework: &str, severity: Severity, pattern_hit: bool, llm_confidence: f64) -> ComplianceVerdict {
        let rule = Rule {
            id: format!("{}-001", framework),
            name: "Rule".to_string(),
            description: "Description".to_string(),
            severity,
            framework: framework.to_string(),
            patterns: vec![],
            llm_prompt: None,
        };
        let patterns = if pattern_hit {
            PatternMatch {
                hit: true,
                evidence: vec![PatternEvidence::from_match("x", "x", 0, 1)],
            }
        } else {
            PatternMatch::none()
        };
        let llm = LlmVerdict {
            violation: false,
            confidence: llm_confidence,
            evidence: vec![],
            explanation: String::new(),
        };
        ComplianceVerdict::merge("doc", &rule, patterns, llm)
    }

    #[test]
    fn test_empty_batch() {
        let report = summarize(&[]);
        assert_eq!(report.status, ReportStatus::NoViolationsFound);
        assert!(report.summary.is_none());
        assert!(!report.has_violations());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "status": "No violations found", "summary": {} })
        );
    }

    #[test]
    fn test_breakdowns_only_contain_observed_keys() {
        let verdicts = vec![
            verdict("GDPR", Severity::High, true, 0.0),
            verdict("GDPR", Severity::Low, true, 0.0),
            verdict("SOX", Severity::High, false, 0.3),
            verdict("HIPAA", Severity::Medium, true, 0.0),
        ];
        let report = summarize(&verdicts);
        let summary = report.summary.as_ref().unwrap();

        assert_eq!(report.status, ReportStatus::AnalysisComplete);
        assert_eq!(summary.total_checks, 4);
        assert_eq!(summary.total_violations, 3);
        assert_eq!(summary.violations_by_framework.get("GDPR"), Some(&2));
        assert_eq!(summary.violations_by_framework.get("HIPAA"), Some(&1));
        assert!(!summary.violations_by_framework.contains_key("SOX"));
        assert_eq!(summary.violations_by_severity.get("HIGH"), Some(&1));
        assert_eq!(summary.violations_by_severity.get("LOW"), Some(&1));
        assert_eq!(summary.violations_by_severity.get("MEDIUM"), Some(&1));
        assert_eq!(summary.high_confidence_violations, 3);
        assert_eq!(summary.compliance_score, 25.0);
        assert_eq!(report.violations().count(), 3);
        assert_eq!(report.detailed_results.len(), 4);
    }

    #[test]
    fn test_no_violations_is_still_complete() {
        let report = summarize(&[verdict("SOX", Severity::Low, false, 0.0)]);
        assert_eq!(report.status, ReportStatus::AnalysisComplete);
        assert_eq!(report.summary.as_ref().unwrap().compliance_score, 100.0);
        assert!(!report.has_violations());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "Analysis Complete");
        assert_eq!(value["summary"]["violations_by_framework"], serde_json::json!({}));
    }

    #[test]
    fn test_render_text() {
        let report = summarize(&[verdict("GDPR", Severity::High, true, 0.0)]);
        let text = render_text(&report);
        assert!(text.starts_with("Status: Analysis Complete"));
        assert!(text.contains("Compliance score: 0.0%"));
        assert!(text.contains("[HIGH] GDPR GDPR-001"));
        assert!(text.contains("Found 'x' in context"));

        assert_eq!(render_text(&summarize(&[])), "Status: No violations found\n");
    }

    proptest! {
        #[test]
        fn prop_compliance_score(hits in proptest::collection::vec(any::<bool>(), 1..40)) {
            let verdicts: Vec<_> = hits
                .iter()
                .map(|&hit| verdict("GDPR", Severity::Medium, hit, 0.0))
                .collect();
            let report = summarize(&verdicts);
            let summary = report.summary.unwrap();

            let n = hits.len();
            let v = hits.iter().filter(|&&h| h).count();
            prop_assert_eq!(summary.total_violations, v);
            prop_assert!((summary.compliance_score - 100.0 * (n - v) as f64 / n as f64).abs() < 1e-9);
        }
    }
}
