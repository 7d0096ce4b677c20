//! Adjudication prompt.
//!
//! The prompt has a fixed shape: rule, analysis instruction, optional
//! retrieved passages, the document prefix, then the response format.
//! The document is cut to its first `content_prefix_chars` characters.

use regwatch_core::Rule;

/// Instruction used when a rule has no `llm_prompt`.
pub const DEFAULT_ANALYSIS_INSTRUCTION: &str = "Analyze this document for compliance violations.";

/// Expected response shape, matching the embedded verdict schema.
pub const RESPONSE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "violation": true | false,
  "confidence": 0.0-1.0,
  "evidence": ["exact quotes from the document that support your finding"],
  "explanation": "brief explanation of your reasoning"
}"#;

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the prompt for one (document, rule) pair.
pub fn build_adjudication_prompt(
    rule: &Rule,
    content: &str,
    content_prefix_chars: usize,
    context_passages: &[String],
) -> String {
    let instruction = rule
        .llm_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_ANALYSIS_INSTRUCTION);

    let mut prompt = format!(
        "You are a compliance analyst reviewing a document against the {framework} framework.\n\n\
         Rule: {name} ({id})\n\
         Description: {description}\n\
         Severity: {severity}\n\n\
         {instruction}\n",
        framework = rule.framework,
        name = rule.name,
        id = rule.id,
        description = rule.description,
        severity = rule.severity,
        instruction = instruction,
    );

    if !context_passages.is_empty() {
        prompt.push_str("\nMost relevant passages:\n");
        for (i, passage) in context_passages.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, passage));
        }
    }

    prompt.push_str("\nDocument content:\n");
    prompt.push_str(truncate_chars(content, content_prefix_chars));
    prompt.push_str("\n\n");
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
