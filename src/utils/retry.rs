use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::metrics::Metrics;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Used at startup while dependencies (database, broker) come up. Lifecycle
// operations never retry: a failed write is reported to the caller and a
// failed notification is logged and dropped.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::from_millis((current.as_millis() as f64 * self.multiplier) as u64);
        scaled.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or `max_attempts` is exhausted,
/// returning the last error in the latter case.
pub async fn retry_with_backoff<F, Fut, T, E>(
    name: &str,
    config: &RetryConfig,
    metrics: Option<&Metrics>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        if let Some(metrics) = metrics {
            metrics.record_retry_attempt(name, attempt);
        }

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = name, attempt, "Succeeded after retry");
                }
                if let Some(metrics) = metrics {
                    metrics.record_retry_outcome(name, true);
                }
                return Ok(value);
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(operation = name, attempt, error = %error, "Giving up");
                if let Some(metrics) = metrics {
                    metrics.record_retry_outcome(name, false);
                }
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(
                    operation = name,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, backing off"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
