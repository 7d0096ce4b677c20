//! Resilience around LLM calls.
//!
//! This module provides:
//! - Circuit breaker to stop calling a failing backend
//! - Bounded retry with backoff and jitter
//! - Usage accounting

mod circuit_breaker;
mod retry;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
pub use usage::{LlmUsage, UsageTracker};
