//! Circuit breaker for engine reliability.
//!
//! Prevents repeated calls to failing engines. One breaker per engine name,
//! held in a process-wide registry that outlives any individual task.
//! State machine: closed -> open -> half-open -> closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::domain::error::RunnerError;

/// Consecutive failures before a breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Seconds an open breaker waits before allowing a half-open probe.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(300);

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the recovery timeout elapses.
    Open,
    /// One probe request is allowed through to test recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Per-engine circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_count: u32,
    opened_at: Option<Instant>,
    state: CircuitState,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_params(name, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }

    pub fn with_params(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            failure_count: 0,
            opened_at: None,
            state: CircuitState::Closed,
        }
    }

    /// Current state, accounting for the recovery timeout.
    ///
    /// An open breaker transitions to half-open the first time it is
    /// queried after `recovery_timeout` has elapsed.
    pub fn state(&mut self) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if opened_at.elapsed() >= self.recovery_timeout {
                    self.state = CircuitState::HalfOpen;
                }
            }
        }
        self.state
    }

    /// True when a request should be allowed through.
    pub fn allow_request(&mut self) -> bool {
        matches!(self.state(), CircuitState::Closed | CircuitState::HalfOpen)
    }

    /// Seconds until an open breaker would allow a probe; 0 when not open.
    pub fn retry_after_seconds(&self) -> f64 {
        match self.opened_at {
            Some(opened_at) if self.state == CircuitState::Open => {
                (self.recovery_timeout.saturating_sub(opened_at.elapsed())).as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Record a successful execution: resets the count, closes the circuit.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            tracing::info!(name = %self.name, "circuit_breaker.closed");
        }
        self.failure_count = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    /// Record a failed execution.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            tracing::warn!(name = %self.name, "circuit_breaker.reopened");
        } else if self.failure_count >= self.failure_threshold {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            tracing::warn!(
                name = %self.name,
                failures = self.failure_count,
                "circuit_breaker.opened"
            );
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

/// Process-wide registry of per-engine breakers.
///
/// Shared across all tasks; expose [`BreakerRegistry::reset`] so tests can
/// isolate themselves from earlier runs.
#[derive(Clone, Default)]
pub struct BreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the engine's breaker admits a request.
    ///
    /// Rejections carry the seconds remaining until a half-open probe.
    pub async fn allow(&self, engine: &str) -> Result<(), RunnerError> {
        let mut breakers = self.breakers.write().await;
        let breaker = breakers
            .entry(engine.to_string())
            .or_insert_with(|| CircuitBreaker::new(engine));
        if breaker.allow_request() {
            Ok(())
        } else {
            Err(RunnerError::CircuitOpen {
                engine: engine.to_string(),
                retry_after_seconds: breaker.retry_after_seconds(),
            })
        }
    }

    /// Record a successful engine run.
    pub async fn record_success(&self, engine: &str) {
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(engine.to_string())
            .or_insert_with(|| CircuitBreaker::new(engine))
            .record_success();
    }

    /// Record a failed engine run.
    pub async fn record_failure(&self, engine: &str) {
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(engine.to_string())
            .or_insert_with(|| CircuitBreaker::new(engine))
            .record_failure();
    }

    /// Current state of the engine's breaker, if one exists.
    pub async fn state(&self, engine: &str) -> Option<CircuitState> {
        let mut breakers = self.breakers.write().await;
        breakers.get_mut(engine).map(CircuitBreaker::state)
    }

    /// Replace the engine's breaker. Used by tests to pre-stamp state.
    pub async fn insert(&self, breaker: CircuitBreaker) {
        let mut breakers = self.breakers.write().await;
        breakers.insert(breaker.name.clone(), breaker);
    }

    /// Drop all breakers. Used for test isolation and shutdown.
    pub async fn reset(&self) {
        self.breakers.write().await.clear();
    }
}
