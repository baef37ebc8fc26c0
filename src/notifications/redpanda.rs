use async_trait::async_trait;
use std::sync::Arc;

use super::{NotificationDispatcher, NotificationError, NotificationRequest};
use crate::messaging::{PublishError, RedpandaClient};

/// Publishes notification requests for an external mail worker to render
/// and send. Keyed by tracking code so one order's mails stay ordered.
pub struct RedpandaDispatcher {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl RedpandaDispatcher {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RedpandaDispatcher {
    fn name(&self) -> &'static str {
        "redpanda"
    }

    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(request)
            .map_err(|e| NotificationError::Transport(format!("encode: {}", e)))?;

        self.client
            .publish(&self.topic, request.order.tracking_code.as_str(), &payload)
            .await
            .map_err(|e| match e {
                PublishError::CircuitOpen(_) => NotificationError::Unavailable(e.to_string()),
                PublishError::Send(_) => NotificationError::Transport(e.to_string()),
            })
    }
}
