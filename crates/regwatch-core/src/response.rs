//! Parsing of the adjudicator's LLM output.
//!
//! Backends are asked for a bare JSON object but often wrap it in prose or a
//! fenced code block. The object is extracted, checked against the embedded
//! verdict schema, then deserialized. Anything that fails these steps is a
//! [`ParseFailure`]; the caller turns it into [`LlmVerdict::unparsable`].

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::schema;
use crate::verdict::LlmVerdict;

lazy_static! {
    /// A fenced code block whose body is a JSON object.
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap();
}

/// Why an LLM response could not be read as a verdict.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("No JSON object found in response")]
    NoJson,

    #[error("Response JSON is malformed: {0}")]
    Json(String),

    #[error("Response does not match the verdict schema: {}", .0.join("; "))]
    Schema(Vec<String>),
}

/// Parse backend output into an [`LlmVerdict`].
pub fn parse_llm_response(text: &str) -> Result<LlmVerdict, ParseFailure> {
    let json = extract_json_object(text).ok_or(ParseFailure::NoJson)?;

    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ParseFailure::Json(e.to_string()))?;
    schema::validate_llm_verdict(&value).map_err(ParseFailure::Schema)?;

    serde_json::from_value(value).map_err(|e| ParseFailure::Json(e.to_string()))
}

/// Locate the JSON object in `text`.
///
/// A fenced block wins; otherwise the first balanced `{...}` is taken.
fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(text) {
        return caps.get(1).map(|m| m.as_str());
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, byte) in text.as_bytes()[start..].iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match byte {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
