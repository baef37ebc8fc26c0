// ============================================================================
// Notifications - Best-effort side channel for lifecycle emails
// ============================================================================
//
// The lifecycle decides WHEN to notify and WHAT data to send. Delivery is
// somebody else's job: a NotificationDispatcher hands the request over
// (to a broker, an SMTP relay, or nowhere at all for NoopDispatcher).
//
// BestEffortNotifier is the only thing the lifecycle calls. It bounds every
// dispatch with a timeout and swallows failures after logging and counting
// them, so a committed write is never turned into an error by this path.
//
// ============================================================================

mod redpanda;

pub use redpanda::RedpandaDispatcher;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{GeoPoint, Order, OrderStatus, TrackingCode};
use crate::metrics::Metrics;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Notification transport error: {0}")]
    Transport(String),
}

/// Where a notification goes. Built only when an email is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub name: Option<String>,
    pub email: String,
}

impl Recipient {
    pub fn from_contact(name: Option<&str>, email: Option<&str>) -> Option<Self> {
        let email = email.map(str::trim).filter(|e| !e.is_empty())?;
        Some(Self {
            name: name.map(str::to_string),
            email: email.to_string(),
        })
    }
}

/// Order fields a notification template needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub tracking_code: TrackingCode,
    pub status: OrderStatus,
    pub pickup_address: String,
    pub delivery_address: String,
    pub courier_service: String,
    pub package_weight: f64,
    pub price: Decimal,
    pub receiver_name: Option<String>,
    pub delivery_location: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderSnapshot {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            tracking_code: order.tracking_code.clone(),
            status: order.status,
            pickup_address: order.pickup_address.clone(),
            delivery_address: order.delivery_address.clone(),
            courier_service: order.courier_service.clone(),
            package_weight: order.package_weight,
            price: order.price,
            receiver_name: order.receiver.name.clone(),
            delivery_location: order.delivery_location,
            updated_at: order.updated_at,
        }
    }
}

/// What happened, with the intent-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notice {
    OrderCreatedSender,
    #[serde(rename_all = "camelCase")]
    OrderCreatedRecipient {
        sender_name: Option<String>,
    },
    StatusChanged {
        reason: Option<String>,
    },
    LocationUpdated,
    #[serde(rename_all = "camelCase")]
    CourierAssigned {
        courier_name: String,
    },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::OrderCreatedSender => "order_created_sender",
            Notice::OrderCreatedRecipient { .. } => "order_created_recipient",
            Notice::StatusChanged { .. } => "status_changed",
            Notice::LocationUpdated => "location_updated",
            Notice::CourierAssigned { .. } => "courier_assigned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub recipient: Recipient,
    #[serde(flatten)]
    pub notice: Notice,
    pub order: OrderSnapshot,
}

impl NotificationRequest {
    pub fn new(recipient: Recipient, notice: Notice, order: &Order) -> Self {
        Self {
            recipient,
            notice,
            order: OrderSnapshot::from(order),
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), NotificationError>;
}

/// Used when no mail transport is configured. Accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), NotificationError> {
        tracing::trace!(kind = request.notice.kind(), "Notification dropped (no transport)");
        Ok(())
    }
}

/// Wraps a dispatcher so its failures can never reach the caller.
#[derive(Clone)]
pub struct BestEffortNotifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl BestEffortNotifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            dispatcher,
            timeout,
            metrics,
        }
    }

    pub fn dispatcher_name(&self) -> &'static str {
        self.dispatcher.name()
    }

    /// Dispatch to every recipient concurrently. Recipients without an email
    /// are skipped. Returns how many dispatches succeeded.
    pub async fn notify<I>(&self, order: &Order, notice: Notice, recipients: I) -> usize
    where
        I: IntoIterator<Item = Option<Recipient>>,
    {
        let kind = notice.kind();
        let mut requests = Vec::new();
        for recipient in recipients {
            match recipient {
                Some(recipient) => requests.push(NotificationRequest::new(recipient, notice.clone(), order)),
                None => {
                    tracing::debug!(order_id = %order.id, kind, "No email for recipient, skipping");
                    self.metrics.record_notification(kind, "skipped");
                }
            }
        }

        let outcomes = join_all(requests.iter().map(|request| self.deliver(request))).await;
        outcomes.into_iter().filter(|delivered| *delivered).count()
    }

    async fn deliver(&self, request: &NotificationRequest) -> bool {
        let kind = request.notice.kind();
        let result = match tokio::time::timeout(self.timeout, self.dispatcher.dispatch(request)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                self.metrics.record_notification(kind, "sent");
                true
            }
            Err(e) => {
                let outcome = match e {
                    NotificationError::Timeout(_) => "timeout",
                    _ => "failed",
                };
                tracing::warn!(
                    order_id = %request.order.order_id,
                    tracking_code = %request.order.tracking_code,
                    kind,
                    dispatcher = self.dispatcher.name(),
                    error = %e,
                    "Notification failed; order change stands"
                );
                self.metrics.record_notification(kind, outcome);
                false
            }
        }
    }
}

// ============================================================================
// Test Dispatchers
// ============================================================================
