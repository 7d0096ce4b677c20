//! JSON Schema validation for rule files and LLM responses.
//!
//! Both schemas are embedded at compile time and compiled once on first use.

use std::sync::OnceLock;
use thiserror::Error;

/// Schema every framework rule file must satisfy.
pub(crate) static RULE_FILE_SCHEMA: EmbeddedSchema =
    EmbeddedSchema::new("rule_file", include_str!("../schema/rule_file.schema.json"));

/// Schema the adjudicator's LLM response must satisfy.
pub(crate) static LLM_VERDICT_SCHEMA: EmbeddedSchema =
    EmbeddedSchema::new("llm_verdict", include_str!("../schema/llm_verdict.schema.json"));

/// Errors from schema compilation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema '{name}': {message}")]
    LoadError { name: &'static str, message: String },
}

/// A JSON Schema shipped inside the crate, compiled lazily.
pub(crate) struct EmbeddedSchema {
    name: &'static str,
    source: &'static str,
    compiled: OnceLock<Result<jsonschema::Validator, String>>,
}

impl EmbeddedSchema {
    const fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            source,
            compiled: OnceLock::new(),
        }
    }

    fn validator(&self) -> Result<&jsonschema::Validator, SchemaError> {
        let result = self.compiled.get_or_init(|| {
            let schema_value: serde_json::Value = match serde_json::from_str(self.source) {
                Ok(v) => v,
                Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
            };

            match jsonschema::options().build(&schema_value) {
                Ok(v) => Ok(v),
                Err(e) => Err(format!("Failed to compile schema: {}", e)),
            }
        });

        match result {
            Ok(v) => Ok(v),
            Err(e) => Err(SchemaError::LoadError {
                name: self.name,
                message: e.clone(),
            }),
        }
    }

    /// Validate a JSON value, collecting every violation as a readable message.
    pub(crate) fn validate(&self, instance: &serde_json::Value) -> Result<(), Vec<String>> {
        let validator = self.validator().map_err(|e| vec![e.to_string()])?;

        let errors: Vec<String> = validator
            .iter_errors(instance)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Check a rule file document against the rule file schema.
pub fn validate_rule_file(document: &serde_json::Value) -> Result<(), Vec<String>> {
    RULE_FILE_SCHEMA.validate(document)
}

/// Check an LLM response object against the verdict schema.
pub fn validate_llm_verdict(response: &serde_json::Value) -> Result<(), Vec<String>> {
    LLM_VERDICT_SCHEMA.validate(response)
}
