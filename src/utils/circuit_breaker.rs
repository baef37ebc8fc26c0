use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::metrics::Metrics;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards calls to an external dependency (the notification broker). After
// `failure_threshold` consecutive failures the breaker opens and rejects
// calls without touching the dependency until `open_for` has elapsed; then a
// probe is let through (HalfOpen) and `success_threshold` successes close it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    fn gauge_value(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_for: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    metrics: Option<Arc<Metrics>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        metrics.update_circuit_breaker_state(CircuitState::Closed.gauge_value());
        self.metrics = Some(metrics);
        self
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut guard = self.state.lock().await;
            if guard.state == CircuitState::Open {
                let elapsed = guard.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed < self.config.open_for {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                guard.successes = 0;
                self.move_to(&mut guard, CircuitState::HalfOpen);
            }
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.state.lock().await;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.successes += 1;
                if guard.successes >= self.config.success_threshold {
                    guard.failures = 0;
                    guard.successes = 0;
                    guard.opened_at = None;
                    self.move_to(&mut guard, CircuitState::Closed);
                }
            }
            CircuitState::Closed => guard.failures = 0,
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.state.lock().await;
        guard.failures += 1;
        match guard.state {
            CircuitState::Closed if guard.failures >= self.config.failure_threshold => {
                guard.opened_at = Some(Instant::now());
                self.move_to(&mut guard, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                guard.successes = 0;
                guard.opened_at = Some(Instant::now());
                self.move_to(&mut guard, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn move_to(&self, guard: &mut BreakerState, next: CircuitState) {
        let previous = guard.state;
        guard.state = next;
        match next {
            CircuitState::Open => tracing::warn!(
                breaker = self.name,
                failures = guard.failures,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                breaker = self.name,
                from = previous.as_str(),
                to = next.as_str(),
                "Circuit breaker state change"
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_breaker_transition(previous.as_str(), next.as_str());
            metrics.update_circuit_breaker_state(next.gauge_value());
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }
}
