//! LLM usage accounting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated LLM usage of an engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmUsage {
    /// Backend calls that returned a response
    pub llm_calls: u32,

    pub prompt_tokens: u32,

    pub completion_tokens: u32,

    pub total_tokens: u32,

    /// Adjudications that ended in a failed verdict
    pub failures: u32,

    /// Responses that did not match the verdict schema
    pub unparsable_responses: u32,
}

impl LlmUsage {
    /// Add token usage from a backend response.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.llm_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
    }
}

/// Thread-safe [`LlmUsage`] accumulator shared by concurrent analyses.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_response(&self, usage: &TokenUsage) {
        self.usage.write().add(usage);
    }

    pub fn record_failure(&self) {
        self.usage.write().failures += 1;
    }

    pub fn record_unparsable(&self) {
        self.usage.write().unparsable_responses += 1;
    }

    /// Current totals.
    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn reset(&self) {
        *self.usage.write() = LlmUsage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let tracker = UsageTracker::new();
        tracker.record_response(&TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
        });
        tracker.record_response(&TokenUsage {
            prompt_tokens: 50,
            completion_tokens: 5,
        });
        tracker.record_failure();
        tracker.record_unparsable();

        let usage = tracker.snapshot();
        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.prompt_tokens, 150);
        assert_eq!(usage.completion_tokens, 25);
        assert_eq!(usage.total_tokens, 175);
        assert_eq!(usage.failures, 1);
        assert_eq!(usage.unparsable_responses, 1);

        tracker.reset();
        assert_eq!(tracker.snapshot(), LlmUsage::default());
    }
}
