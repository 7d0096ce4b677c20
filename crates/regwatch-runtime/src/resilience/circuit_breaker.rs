//! Circuit breaker around LLM backends.
//!
//! When a backend fails repeatedly the circuit opens and adjudication
//! short-circuits to a failed verdict until the recovery timeout passes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::humantime_duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before a recovery attempt is allowed
    #[serde(with = "humantime_duration")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// All calls bypass the backend
    Open { opened_at: Instant },

    /// Testing if the backend recovered, one call at a time
    HalfOpen {
        successes: u32,
        /// Start of the admitted call still in flight
        trial_started: Option<Instant>,
    },
}

/// Circuit breaker keyed by backend name.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether a call to `backend` should be skipped.
    ///
    /// While half-open only one call is admitted at a time; the caller that
    /// gets `false` must report back with `record_success` or
    /// `record_failure`. A recovery call that never reports back stops
    /// blocking others after the recovery timeout.
    pub fn is_open(&self, backend: &str) -> bool {
        let mut states = self.states.write();
        let now = Instant::now();
        match states.get(backend).cloned() {
            Some(CircuitState::Open { opened_at }) => {
                if now.duration_since(opened_at) < self.config.recovery_timeout {
                    return true;
                }
                states.insert(
                    backend.to_string(),
                    CircuitState::HalfOpen {
                        successes: 0,
                        trial_started: Some(now),
                    },
                );
                tracing::info!(provider = backend, "Circuit half-open, allowing a recovery call");
                false
            }
            Some(CircuitState::HalfOpen {
                successes,
                trial_started,
            }) => {
                let busy = trial_started
                    .is_some_and(|started| now.duration_since(started) < self.config.recovery_timeout);
                if busy {
                    return true;
                }
                states.insert(
                    backend.to_string(),
                    CircuitState::HalfOpen {
                        successes,
                        trial_started: Some(now),
                    },
                );
                false
            }
            _ => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, backend: &str) {
        let mut states = self.states.write();
        match states.get(backend).cloned() {
            Some(CircuitState::HalfOpen { successes, .. }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(backend.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(provider = backend, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        backend.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                            trial_started: None,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(backend.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, backend: &str) {
        let mut states = self.states.write();
        let failures = match states.get(backend).cloned() {
            Some(CircuitState::Closed { failures }) => failures,
            None => 0,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    backend.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(provider = backend, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                backend.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                provider = backend,
                failures = failures + 1,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(
                backend.to_string(),
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    /// Current state of a backend's circuit.
    pub fn state(&self, backend: &str) -> CircuitState {
        self.states
            .read()
            .get(backend)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
