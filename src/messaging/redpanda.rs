use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("Kafka send error: {0}")]
    Send(#[from] rdkafka::error::KafkaError),
}

/// Kafka-protocol producer guarded by a circuit breaker.
pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()?;

        let circuit_breaker = CircuitBreaker::new(
            "redpanda",
            CircuitBreakerConfig {
                failure_threshold: 5,
                open_for: Duration::from_secs(30),
                success_threshold: 3,
            },
        );

        Ok(Self {
            producer,
            circuit_breaker,
            send_timeout,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_metrics(metrics);
        self
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(topic).key(key).payload(payload);
                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic, key, "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(topic, "Circuit breaker open - Redpanda unavailable");
                Err(PublishError::CircuitOpen(topic.to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic, "Failed to publish to Redpanda");
                Err(PublishError::Send(e))
            }
        }
    }
}
