//! Deterministic trigger-phrase scan.
//!
//! Each pattern of a rule is searched case-insensitively in pattern order.
//! Only the first occurrence of a pattern is recorded as evidence.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::warn;

use crate::evidence::PatternEvidence;
use crate::rules::{Rule, RuleSet};

/// Outcome of scanning one document against one rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternMatch {
    /// True iff at least one pattern occurs in the text
    pub hit: bool,

    /// First occurrence of each matching pattern, in pattern order
    pub evidence: Vec<PatternEvidence>,
}

impl PatternMatch {
    /// A scan with no hits.
    pub fn none() -> Self {
        Self::default()
    }
}

/// The pattern matcher.
///
/// Patterns of the rules it was built for are compiled once, up front.
/// Any other pattern is compiled on use.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    compiled: HashMap<String, Regex>,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matcher with every pattern of `rules` precompiled.
    pub fn for_rules(rules: &RuleSet) -> Self {
        let mut compiled = HashMap::new();
        for rule in rules.iter().flat_map(|f| f.rules.iter()) {
            for pattern in rule.patterns.iter().filter(|p| !p.is_empty()) {
                if compiled.contains_key(pattern) {
                    continue;
                }
                match literal_regex(pattern) {
                    Ok(re) => {
                        compiled.insert(pattern.clone(), re);
                    }
                    Err(e) => {
                        warn!(rule_id = %rule.id, pattern = %pattern, error = %e, "Skipping uncompilable pattern");
                    }
                }
            }
        }
        Self { compiled }
    }

    /// Number of precompiled patterns.
    pub fn compiled_patterns(&self) -> usize {
        self.compiled.len()
    }

    /// Scan `text` for every pattern of `rule`.
    pub fn match_rule(&self, text: &str, rule: &Rule) -> PatternMatch {
        let evidence: Vec<PatternEvidence> = rule
            .patterns
            .iter()
            .filter(|p| !p.is_empty())
            .filter_map(|pattern| {
                let re = self.regex_for(rule, pattern)?;
                re.find(text)
                    .map(|m| PatternEvidence::from_match(pattern.as_str(), text, m.start(), m.end()))
            })
            .collect();

        PatternMatch {
            hit: !evidence.is_empty(),
            evidence,
        }
    }

    fn regex_for(&self, rule: &Rule, pattern: &str) -> Option<Cow<'_, Regex>> {
        if let Some(re) = self.compiled.get(pattern) {
            return Some(Cow::Borrowed(re));
        }
        match literal_regex(pattern) {
            Ok(re) => Some(Cow::Owned(re)),
            Err(e) => {
                warn!(rule_id = %rule.id, pattern = %pattern, error = %e, "Skipping uncompilable pattern");
                None
            }
        }
    }
}

/// Case-insensitive matcher for a literal phrase.
fn literal_regex(phrase: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&regex::escape(phrase))
        .case_insensitive(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Severity;
    use proptest::prelude::*;

    fn rule(patterns: &[&str]) -> Rule {
        Rule {
            id: "R1".to_string(),
            name: "Sensitive identifiers".to_string(),
            description: "Stores identifiers insecurely".to_string(),
            severity: Severity::High,
            framework: "HIPAA".to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            llm_prompt: None,
        }
    }

    #[test]
    fn test_case_insensitive_hit() {
        let text = "We store the SSN in plaintext.";
        let result = PatternMatcher::new().match_rule(text, &rule(&["ssn"]));
        assert!(result.hit);
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].matched_phrase, "ssn");
        assert!(result.evidence[0].context_snippet.contains("SSN"));
    }

    #[test]
    fn test_no_patterns_means_no_hit() {
        let result = PatternMatcher::new().match_rule("anything at all", &rule(&[]));
        assert_eq!(result, PatternMatch::none());
    }

    #[test]
    fn test_only_first_occurrence_per_pattern() {
        let text = "consent missing. consent missing again.";
        let result = PatternMatcher::new().match_rule(text, &rule(&["consent"]));
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].start, 0);
    }

    #[test]
    fn test_evidence_follows_pattern_order() {
        let text = "shared with third parties without consent";
        let result =
            PatternMatcher::new().match_rule(text, &rule(&["without consent", "absent", "third parties"]));
        let phrases: Vec<_> = result.evidence.iter().map(|e| e.matched_phrase.as_str()).collect();
        assert_eq!(phrases, vec!["without consent", "third parties"]);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let result = PatternMatcher::new().match_rule("costs $5 (approx.)", &rule(&["(approx.)", "a.b"]));
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].matched_phrase, "(approx.)");
    }

    #[test]
    fn test_offsets_point_into_original_text() {
        let text = "Straße data: PASSWORD stored";
        let result = PatternMatcher::new().match_rule(text, &rule(&["password"]));
        let e = &result.evidence[0];
        assert_eq!(&text[e.start..e.end], "PASSWORD");
    }

    #[test]
    fn test_rule_set_patterns_compiled_once() {
        let rules = RuleSet::from_sources([
            (
                "GDPR",
                r#"{"rules": [
                    {"id": "GDPR-001", "name": "Consent", "description": "No consent", "patterns": ["without consent", "opt-out"]},
                    {"id": "GDPR-002", "name": "Retention", "description": "Kept forever", "patterns": ["without consent"]}
                ]}"#,
            ),
            (
                "HIPAA",
                r#"{"rules": [{"id": "HIPAA-001", "name": "PHI", "description": "Unencrypted", "patterns": ["SSN"]}]}"#,
            ),
        ])
        .unwrap();

        let matcher = PatternMatcher::for_rules(&rules);
        assert_eq!(matcher.compiled_patterns(), 3);

        let text = "Data is shared WITHOUT CONSENT; the ssn is logged.";
        for rule in rules.iter().flat_map(|f| f.rules.iter()) {
            assert_eq!(
                matcher.match_rule(text, rule),
                PatternMatcher::new().match_rule(text, rule)
            );
        }
    }

    #[test]
    fn test_unknown_rule_still_matches() {
        let matcher = PatternMatcher::for_rules(&RuleSet::new());
        assert_eq!(matcher.compiled_patterns(), 0);
        assert!(matcher.match_rule("plain SSN", &rule(&["ssn"])).hit);
    }

    proptest! {
        #[test]
        fn prop_hit_iff_case_insensitive_substring(
            text in "[a-zA-Z ]{0,80}",
            patterns in proptest::collection::vec("[a-zA-Z]{1,4}", 0..4),
        ) {
            let pattern_refs: Vec<&str> = patterns.iter().map(|s| s.as_str()).collect();
            let result = PatternMatcher::new().match_rule(&text, &rule(&pattern_refs));
            let lowered = text.to_lowercase();
            let expected = patterns.iter().any(|p| lowered.contains(&p.to_lowercase()));

            prop_assert_eq!(result.hit, expected);
            prop_assert_eq!(result.hit, !result.evidence.is_empty());
            prop_assert!(result.evidence.len() <= patterns.len());
        }
    }
}
