//! Rule file parsing from JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::schema;

/// Errors that can occur when loading a rule file.
#[derive(Error, Debug)]
pub enum RuleLoadError {
    #[error("Failed to read rule file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rule file failed schema validation: {}", .0.join("; "))]
    SchemaError(Vec<String>),

    #[error("Rule #{index} in framework {framework} is missing required field '{field}'")]
    MissingField {
        framework: String,
        index: usize,
        field: &'static str,
    },

    #[error("Rule validation failed: {0}")]
    ValidationError(String),
}

/// How serious a violation of a rule is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compliance rule.
///
/// Identity is `(framework, id)`. Rules are immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Identifier unique within the framework (e.g., "GDPR-001")
    #[serde(default)]
    pub id: String,

    /// Short human-readable name
    #[serde(default)]
    pub name: String,

    /// What a violation of this rule looks like
    #[serde(default)]
    pub description: String,

    /// Defaults to MEDIUM when absent from the file
    #[serde(default)]
    pub severity: Severity,

    /// Framework this rule belongs to, stamped from the file name at load time
    #[serde(default, skip_deserializing)]
    pub framework: String,

    /// Trigger phrases, matched case-insensitively in order
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Analysis instruction for the LLM adjudicator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_prompt: Option<String>,
}

/// On-disk shape of a rule file.
#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    description: String,
    rules: Vec<Rule>,
}

/// All rules of one compliance framework.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FrameworkRules {
    /// Uppercase framework name (e.g., "GDPR")
    pub framework: String,

    /// Human-readable description of the framework
    pub description: String,

    /// Rules in file order
    pub rules: Vec<Rule>,
}

impl FrameworkRules {
    /// Parse a framework's rules from a JSON string.
    pub fn from_json(framework: impl Into<String>, json: &str) -> Result<Self, RuleLoadError> {
        let framework = framework.into().to_uppercase();

        let value: serde_json::Value = serde_json::from_str(json)?;
        schema::validate_rule_file(&value).map_err(RuleLoadError::SchemaError)?;

        let file: RuleFile = serde_json::from_value(value)?;
        let rules = file
            .rules
            .into_iter()
            .map(|mut rule| {
                rule.framework = framework.clone();
                rule
            })
            .collect();

        let loaded = Self {
            framework,
            description: file.description,
            rules,
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a rule file, deriving the framework name from the file name.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RuleLoadError> {
        let path = path.as_ref();
        let framework = framework_name_from_path(path).ok_or_else(|| {
            RuleLoadError::ValidationError(format!(
                "Cannot derive a framework name from {}",
                path.display()
            ))
        })?;
        let contents = fs::read_to_string(path)?;
        Self::from_json(framework, &contents)
    }

    /// Look up a rule by id.
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Validate the rule entries.
    fn validate(&self) -> Result<(), RuleLoadError> {
        for (index, rule) in self.rules.iter().enumerate() {
            for (field, value) in [
                ("id", &rule.id),
                ("name", &rule.name),
                ("description", &rule.description),
            ] {
                if value.trim().is_empty() {
                    return Err(RuleLoadError::MissingField {
                        framework: self.framework.clone(),
                        index,
                        field,
                    });
                }
            }

            if rule.patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(RuleLoadError::ValidationError(format!(
                    "Rule {} in {} has a blank pattern",
                    rule.id, self.framework
                )));
            }
        }

        self.validate_unique_rule_ids()
    }

    /// Ensure rule IDs are unique within the framework.
    fn validate_unique_rule_ids(&self) -> Result<(), RuleLoadError> {
        let mut seen = HashSet::new();

        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleLoadError::ValidationError(format!(
                    "Duplicate rule ID in {}: {}",
                    self.framework, rule.id
                )));
            }
        }

        Ok(())
    }
}

/// Derive the framework name from a rule file path.
///
/// The file stem is uppercased after dropping an optional `_rules` suffix,
/// so `gdpr_rules.json` and `gdpr.json` both name the `GDPR` framework.
pub fn framework_name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let base = match stem.len().checked_sub("_rules".len()) {
        Some(cut) if stem.is_char_boundary(cut) && stem[cut..].eq_ignore_ascii_case("_rules") => {
            &stem[..cut]
        }
        _ => stem,
    };

    if base.is_empty() {
        None
    } else {
        Some(base.to_uppercase())
    }
}
