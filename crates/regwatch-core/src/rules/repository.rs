//! The loaded rule set, keyed by framework.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::parser::{framework_name_from_path, FrameworkRules, Rule, RuleLoadError};

/// Every loaded framework, keyed by uppercase framework name.
///
/// Loaded once at engine start. Iteration order is the framework name order.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct RuleSet {
    frameworks: BTreeMap<String, FrameworkRules>,
}

/// A rule file that could not be loaded.
#[derive(Debug)]
pub struct RuleFileFailure {
    pub path: PathBuf,
    pub error: RuleLoadError,
}

/// Outcome of loading a batch of rule files.
///
/// A malformed file is fatal for that file only; the other frameworks
/// still load.
#[derive(Debug, Default)]
pub struct RuleLoadReport {
    pub rule_set: RuleSet,
    pub failures: Vec<RuleFileFailure>,
}

impl RuleLoadReport {
    /// True when every rule file loaded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a framework, replacing any framework with the same name.
    pub fn insert(&mut self, rules: FrameworkRules) -> Option<FrameworkRules> {
        self.frameworks.insert(rules.framework.clone(), rules)
    }

    /// Build a rule set from in-memory `(framework, json)` sources.
    ///
    /// Fails on the first malformed source.
    pub fn from_sources<I, F, S>(sources: I) -> Result<Self, RuleLoadError>
    where
        I: IntoIterator<Item = (F, S)>,
        F: Into<String>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for (framework, json) in sources {
            set.insert(FrameworkRules::from_json(framework, json.as_ref())?);
        }
        Ok(set)
    }

    /// Load every `*.json` rule file in a directory.
    ///
    /// Only an unreadable directory is an error. Individual files that fail
    /// to load are reported in [`RuleLoadReport::failures`].
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<RuleLoadReport, RuleLoadError> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut report = RuleLoadReport::default();
        for path in paths {
            match Self::load_file(&path) {
                Ok(rules) => {
                    if report.rule_set.get(&rules.framework).is_some() {
                        let error = RuleLoadError::ValidationError(format!(
                            "Framework {} is already defined by another rule file",
                            rules.framework
                        ));
                        warn!(path = %path.display(), error = %error, "Skipping rule file");
                        report.failures.push(RuleFileFailure { path, error });
                        continue;
                    }
                    info!(
                        framework = %rules.framework,
                        rules = rules.rules.len(),
                        path = %path.display(),
                        "Loaded rule file"
                    );
                    report.rule_set.insert(rules);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Skipping rule file");
                    report.failures.push(RuleFileFailure { path, error });
                }
            }
        }

        Ok(report)
    }

    /// Load a single rule file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<FrameworkRules, RuleLoadError> {
        let path = path.as_ref();
        if framework_name_from_path(path).is_none() {
            return Err(RuleLoadError::ValidationError(format!(
                "Cannot derive a framework name from {}",
                path.display()
            )));
        }
        FrameworkRules::from_json_file(path)
    }

    /// Rules of one framework.
    pub fn get(&self, framework: &str) -> Option<&FrameworkRules> {
        self.frameworks.get(framework)
    }

    /// Look up a rule by `(framework, id)`.
    pub fn rule(&self, framework: &str, id: &str) -> Option<&Rule> {
        self.get(framework).and_then(|f| f.rule(id))
    }

    /// Framework names in order.
    pub fn frameworks(&self) -> impl Iterator<Item = &str> {
        self.frameworks.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameworkRules> {
        self.frameworks.values()
    }

    /// Number of frameworks.
    pub fn len(&self) -> usize {
        self.frameworks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
    }

    /// Number of rules across all frameworks.
    pub fn total_rules(&self) -> usize {
        self.frameworks.values().map(|f| f.rules.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GDPR: &str = r#"{
        "description": "GDPR",
        "rules": [
            {"id": "GDPR-001", "name": "Consent", "description": "No lawful basis", "patterns": ["without consent"]}
        ]
    }"#;

    const SOX: &str = r#"{
        "description": "SOX",
        "rules": [
            {"id": "SOX-001", "name": "Controls", "description": "Missing internal controls", "severity": "HIGH"}
        ]
    }"#;

    #[test]
    fn test_from_sources() {
        let set = RuleSet::from_sources([("gdpr", GDPR), ("sox", SOX)]).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.frameworks().collect::<Vec<_>>(), vec!["GDPR", "SOX"]);
        assert_eq!(set.rule("SOX", "SOX-001").unwrap().name, "Controls");
        assert!(set.rule("SOX", "SOX-999").is_none());
        assert!(set.get("HIPAA").is_none());
        assert_eq!(set.total_rules(), 2);
    }

    #[test]
    fn test_load_dir_collects_failures_and_keeps_valid_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gdpr_rules.json"), GDPR).unwrap();
        fs::write(dir.path().join("sox_rules.json"), SOX).unwrap();
        fs::write(
            dir.path().join("hipaa_rules.json"),
            r#"{"rules": [{"name": "No id", "description": "d"}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let report = RuleSet::load_dir(dir.path()).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("hipaa_rules.json"));
        assert!(matches!(
            report.failures[0].error,
            RuleLoadError::MissingField { field: "id", .. }
        ));
        assert_eq!(
            report.rule_set.frameworks().collect::<Vec<_>>(),
            vec!["GDPR", "SOX"]
        );
    }

    #[test]
    fn test_load_dir_rejects_duplicate_framework() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("gdpr.json"), GDPR).unwrap();
        fs::write(dir.path().join("gdpr_rules.json"), GDPR).unwrap();

        let report = RuleSet::load_dir(dir.path()).unwrap();
        assert_eq!(report.rule_set.len(), 1);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            RuleSet::load_dir(&missing),
            Err(RuleLoadError::IoError(_))
        ));
    }

    #[test]
    fn test_serializes_as_framework_map() {
        let set = RuleSet::from_sources([("sox", SOX)]).unwrap();
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["SOX"]["rules"][0]["id"], "SOX-001");
        assert_eq!(value["SOX"]["rules"][0]["framework"], "SOX");
    }
}
