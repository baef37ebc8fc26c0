use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{parse_weight, OrderStatus, ReceiverContact};

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

/// Logistics fields shared by both creation paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub pickup_address: String,
    pub delivery_address: String,
    pub courier_service: String,
    pub package_weight: f64,
    pub package_dimensions: String,
    pub price: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub receiver: ReceiverContact,
}

impl OrderDetails {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.pickup_address.trim().is_empty() {
            return Err(OrderError::EmptyField("pickupAddress"));
        }
        if self.delivery_address.trim().is_empty() {
            return Err(OrderError::EmptyField("deliveryAddress"));
        }
        if !self.package_weight.is_finite() || self.package_weight < 0.0 {
            return Err(OrderError::InvalidWeight(self.package_weight.to_string()));
        }
        Ok(())
    }
}

/// Admin path: the customer account must already exist.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub customer_id: Uuid,
    #[serde(flatten)]
    pub details: OrderDetails,
}

/// Contact details an anonymous sender supplies on the public form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zipcode: Option<String>,
}

/// Public path: the customer account is resolved (or created) from the email.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOrderRequest {
    #[serde(default)]
    pub sender: SenderContact,
    pub pickup_address: String,
    pub delivery_address: String,
    pub courier_service: String,
    pub package_weight: String,
    pub package_dimensions: String,
    pub price: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub receiver: ReceiverContact,
}

impl PublicOrderRequest {
    pub fn into_parts(self) -> Result<(SenderContact, OrderDetails), OrderError> {
        let package_weight = parse_weight(&self.package_weight)?;
        let details = OrderDetails {
            pickup_address: self.pickup_address,
            delivery_address: self.delivery_address,
            courier_service: self.courier_service,
            package_weight,
            package_dimensions: self.package_dimensions,
            price: self.price,
            notes: self.notes,
            receiver: self.receiver,
        };
        details.validate()?;
        Ok((self.sender, details))
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub delivery_lat: Option<f64>,
    pub delivery_lng: Option<f64>,
    pub courier_lat: Option<f64>,
    pub courier_lng: Option<f64>,
    pub courier_service: Option<String>,
    pub package_weight: Option<f64>,
    pub package_dimensions: Option<String>,
    pub price: Option<Decimal>,
    pub notes: Option<String>,
    pub status: Option<OrderStatus>,
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl StatusChange {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            reason: None,
            notes: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Range/equality filter; `None` leaves a dimension unconstrained.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, status: OrderStatus, created_at: DateTime<Utc>) -> bool {
        self.status.map_or(true, |wanted| wanted == status)
            && self.from_date.map_or(true, |from| created_at >= from)
            && self.to_date.map_or(true, |to| created_at <= to)
    }
}
