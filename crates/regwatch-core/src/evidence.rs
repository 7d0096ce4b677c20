//! Located evidence for pattern hits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters of surrounding text kept on each side of a match.
pub const CONTEXT_WINDOW_CHARS: usize = 100;

/// One pattern hit in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternEvidence {
    /// The rule pattern that matched
    pub matched_phrase: String,

    /// Text around the match, clamped to the document bounds
    pub context_snippet: String,

    /// Byte offset of the match in the document
    pub start: usize,

    /// Byte offset one past the end of the match
    pub end: usize,
}

impl PatternEvidence {
    /// Build evidence for the match at `start..end` of `text`.
    ///
    /// `start` and `end` must lie on char boundaries of `text`.
    pub fn from_match(phrase: impl Into<String>, text: &str, start: usize, end: usize) -> Self {
        let snippet_start = text[..start]
            .char_indices()
            .rev()
            .take(CONTEXT_WINDOW_CHARS)
            .last()
            .map_or(start, |(i, _)| i);
        let snippet_end = text[end..]
            .char_indices()
            .nth(CONTEXT_WINDOW_CHARS)
            .map_or(text.len(), |(i, _)| end + i);

        Self {
            matched_phrase: phrase.into(),
            context_snippet: text[snippet_start..snippet_end].to_string(),
            start,
            end,
        }
    }
}

impl fmt::Display for PatternEvidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found '{}' in context: ...{}...",
            self.matched_phrase, self.context_snippet
        )
    }
}
