// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::{start_metrics_server, ServerInfo};

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// Provides metrics for:
// - Lifecycle operations (throughput, latency, outcome)
// - Status transitions by target status
// - Best-effort notifications by kind and outcome
// - Fan-out deliveries and drops
// - Startup retries and circuit breaker state
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Lifecycle Metrics
    pub lifecycle_operations: IntCounterVec,
    pub lifecycle_duration: HistogramVec,
    pub status_transitions: IntCounterVec,

    // Side-channel Metrics
    pub notifications: IntCounterVec,
    pub fanout_events: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_outcomes: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let lifecycle_operations = IntCounterVec::new(
            Opts::new("order_lifecycle_operations_total", "Lifecycle operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(lifecycle_operations.clone()))?;

        let lifecycle_duration = HistogramVec::new(
            HistogramOpts::new("order_lifecycle_duration_seconds", "Lifecycle operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(lifecycle_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed status changes by target status"),
            &["status"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let notifications = IntCounterVec::new(
            Opts::new("order_notifications_total", "Best-effort notification attempts"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(notifications.clone()))?;

        let fanout_events = IntCounterVec::new(
            Opts::new("order_fanout_events_total", "Lifecycle events offered to subscribers"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(fanout_events.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_outcomes = IntCounterVec::new(
            Opts::new("retry_outcomes_total", "Retried operations by final outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(retry_outcomes.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            lifecycle_operations,
            lifecycle_duration,
            status_transitions,
            notifications,
            fanout_events,
            retry_attempts_total,
            retry_outcomes,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, duration_secs: f64, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.lifecycle_operations.with_label_values(&[operation, outcome]).inc();
        self.lifecycle_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_transition(&self, status: &str) {
        self.status_transitions.with_label_values(&[status]).inc();
    }

    /// `outcome` is one of `sent`, `skipped`, `failed`, `timeout`.
    pub fn record_notification(&self, kind: &str, outcome: &str) {
        self.notifications.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_fanout(&self, kind: &str, delivered: usize) {
        if delivered == 0 {
            self.fanout_events.with_label_values(&[kind, "dropped"]).inc();
        } else {
            self.fanout_events
                .with_label_values(&[kind, "delivered"])
                .inc_by(delivered as u64);
        }
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total
            .with_label_values(&[operation, &attempt.to_string()])
            .inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.retry_outcomes.with_label_values(&[operation, outcome]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }

    pub fn record_circuit_breaker_transition(&self, from_state: &str, to_state: &str) {
        self.circuit_breaker_transitions
            .with_label_values(&[from_state, to_state])
            .inc();
    }
}
