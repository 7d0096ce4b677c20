//! LLM adjudication of a single (document, rule) pair.
//!
//! [`Adjudicator::adjudicate`] is total: every failure mode resolves to a
//! well-formed [`LlmVerdict`].
//!
//! | Situation                     | Verdict                                   |
//! |-------------------------------|-------------------------------------------|
//! | no backend                    | [`LlmVerdict::not_configured`]            |
//! | circuit open, transport error | [`LlmVerdict::failed`]                    |
//! | response off-schema           | [`LlmVerdict::unparsable`] (fail-open)    |

use backon::Retryable;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use regwatch_core::{parse_llm_response, LlmVerdict, Rule};

use crate::config::LlmSettings;
use crate::prompts::build_adjudication_prompt;
use crate::providers::{CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, LlmUsage, RetryPolicy, UsageTracker};

/// Call parameters for the adjudicator.
#[derive(Debug, Clone)]
pub struct AdjudicatorConfig {
    /// Model override; the backend default is used when `None`
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Bound on one backend attempt
    pub timeout: Duration,

    pub retry: RetryPolicy,

    /// Document characters included in the prompt
    pub content_prefix_chars: usize,

    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for AdjudicatorConfig {
    fn default() -> Self {
        Self::from_settings(&LlmSettings::default(), &CircuitBreakerConfig::default())
    }
}

impl AdjudicatorConfig {
    pub fn from_settings(llm: &LlmSettings, circuit_breaker: &CircuitBreakerConfig) -> Self {
        Self {
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            timeout: llm.timeout,
            retry: RetryPolicy::new(llm.max_retries, llm.retry_delay),
            content_prefix_chars: llm.content_prefix_chars,
            circuit_breaker: circuit_breaker.clone(),
        }
    }
}

/// Asks a language model whether a document violates a rule.
pub struct Adjudicator {
    provider: Option<Arc<dyn LlmProvider>>,
    config: AdjudicatorConfig,
    circuit_breaker: CircuitBreaker,
    usage: UsageTracker,
}

impl Adjudicator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, config: AdjudicatorConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        Self {
            provider,
            config,
            circuit_breaker,
            usage: UsageTracker::new(),
        }
    }

    /// Name of the configured backend, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub fn config(&self) -> &AdjudicatorConfig {
        &self.config
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage.snapshot()
    }

    /// Judge `content` against `rule`.
    ///
    /// `context_passages` are retrieved excerpts added to the prompt; they
    /// never affect anything but the prompt text.
    pub async fn adjudicate(
        &self,
        content: &str,
        rule: &Rule,
        context_passages: &[String],
    ) -> LlmVerdict {
        let Some(provider) = self.provider.as_deref() else {
            return LlmVerdict::not_configured();
        };
        let backend = provider.name();

        if self.circuit_breaker.is_open(backend) {
            warn!(provider = backend, rule_id = %rule.id, "Circuit open, skipping LLM call");
            self.usage.record_failure();
            return LlmVerdict::failed(format!("circuit breaker open for {}", backend));
        }

        let prompt = build_adjudication_prompt(
            rule,
            content,
            self.config.content_prefix_chars,
            context_passages,
        );
        let completion = CompletionConfig {
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            timeout: self.config.timeout,
        };

        match self.complete_with_retry(provider, &prompt, &completion, rule).await {
            Ok(response) => {
                self.circuit_breaker.record_success(backend);
                self.usage.record_response(&response.usage);
                self.interpret(response, rule)
            }
            Err(e) => {
                warn!(provider = backend, rule_id = %rule.id, error = %e, "LLM analysis failed");
                self.circuit_breaker.record_failure(backend);
                self.usage.record_failure();
                LlmVerdict::failed(e)
            }
        }
    }

    /// One backend call per attempt, each bounded by the timeout.
    async fn complete_with_retry(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        completion: &CompletionConfig,
        rule: &Rule,
    ) -> Result<CompletionResponse, ProviderError> {
        let timeout = completion.timeout;
        let attempt = || async move {
            match tokio::time::timeout(timeout, provider.complete(prompt, completion)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            }
        };

        attempt
            .retry(self.config.retry.backoff())
            .when(ProviderError::is_transient)
            .notify(|e: &ProviderError, delay: Duration| {
                debug!(
                    provider = provider.name(),
                    rule_id = %rule.id,
                    error = %e,
                    delay = ?delay,
                    "Retrying LLM call"
                );
            })
            .await
    }

    fn interpret(&self, response: CompletionResponse, rule: &Rule) -> LlmVerdict {
        match parse_llm_response(&response.content) {
            Ok(verdict) => {
                debug!(
                    rule_id = %rule.id,
                    violation = verdict.violation,
                    confidence = verdict.confidence,
                    "LLM verdict"
                );
                verdict
            }
            Err(failure) => {
                warn!(rule_id = %rule.id, error = %failure, "Unparsable LLM response, flagging for review");
                self.usage.record_unparsable();
                LlmVerdict::unparsable(response.content)
            }
        }
    }
}
