use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{OrderDetails, OrderPatch, StatusChange};
use super::errors::OrderError;
use super::history::{StatusHistoryEntry, SYSTEM_ACTOR};
use super::value_objects::{GeoPoint, OrderStatus, ReceiverContact, TrackingCode, TransitionPolicy};

pub const DEFAULT_PATCH_REASON: &str = "Status updated";
pub const DEFAULT_TRANSITION_REASON: &str = "Status changed";

// ============================================================================
// Order - Domain Logic
// ============================================================================
//
// Every mutation returns a new Order plus whatever history entry must be
// written alongside it, so callers persist both in one step or neither.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub tracking_code: TrackingCode,

    // Parties
    pub customer_id: Uuid,
    pub receiver: ReceiverContact,
    pub assigned_courier_id: Option<Uuid>,

    // Logistics
    pub pickup_address: String,
    pub delivery_address: String,
    pub courier_service: String,
    pub package_weight: f64,
    pub package_dimensions: String,
    pub price: Decimal,
    pub notes: Option<String>,
    pub pickup_location: Option<GeoPoint>,
    pub delivery_location: Option<GeoPoint>,
    pub courier_location: Option<GeoPoint>,

    pub status: OrderStatus,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of merging a patch over an order.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub order: Order,
    pub history: Option<StatusHistoryEntry>,
    pub delivery_location_changed: bool,
}

impl Order {
    pub fn create(
        customer_id: Uuid,
        details: OrderDetails,
        tracking_code: TrackingCode,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        details.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            tracking_code,
            customer_id,
            receiver: details.receiver,
            assigned_courier_id: None,
            pickup_address: details.pickup_address,
            delivery_address: details.delivery_address,
            courier_service: details.courier_service,
            package_weight: details.package_weight,
            package_dimensions: details.package_dimensions,
            price: details.price,
            notes: details.notes,
            pickup_location: None,
            delivery_location: None,
            courier_location: None,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Timestamp for the next mutation, strictly after the previous one.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self.updated_at + Duration::microseconds(1);
        if now > floor {
            now
        } else {
            floor
        }
    }

    pub fn apply_patch(
        &self,
        patch: &OrderPatch,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> Result<PatchOutcome, OrderError> {
        let mut next = self.clone();

        if let Some(address) = &patch.pickup_address {
            next.pickup_address = address.clone();
        }
        if let Some(address) = &patch.delivery_address {
            next.delivery_address = address.clone();
        }
        if let Some(service) = &patch.courier_service {
            next.courier_service = service.clone();
        }
        if let Some(weight) = patch.package_weight {
            if !weight.is_finite() || weight < 0.0 {
                return Err(OrderError::InvalidWeight(weight.to_string()));
            }
            next.package_weight = weight;
        }
        if let Some(dimensions) = &patch.package_dimensions {
            next.package_dimensions = dimensions.clone();
        }
        if let Some(price) = patch.price {
            next.price = price;
        }
        if let Some(notes) = &patch.notes {
            next.notes = Some(notes.clone());
        }

        next.pickup_location =
            GeoPoint::merge(self.pickup_location, patch.pickup_lat, patch.pickup_lng, "pickup")?;
        next.delivery_location = GeoPoint::merge(
            self.delivery_location,
            patch.delivery_lat,
            patch.delivery_lng,
            "delivery",
        )?;
        next.courier_location =
            GeoPoint::merge(self.courier_location, patch.courier_lat, patch.courier_lng, "courier")?;

        let timestamp = self.next_timestamp(now);
        next.updated_at = timestamp;

        let history = match patch.status {
            Some(status) if status != self.status => {
                policy.check(self.status, status)?;
                next.status = status;
                Some(StatusHistoryEntry::new(
                    self.id,
                    status,
                    SYSTEM_ACTOR,
                    Some(
                        patch
                            .status_reason
                            .clone()
                            .unwrap_or_else(|| DEFAULT_PATCH_REASON.to_string()),
                    ),
                    patch.notes.clone(),
                    timestamp,
                ))
            }
            _ => None,
        };

        let delivery_location_changed = next.delivery_location != self.delivery_location;

        Ok(PatchOutcome {
            order: next,
            history,
            delivery_location_changed,
        })
    }

    /// Status-only change; always produces a history entry.
    pub fn transition(
        &self,
        change: &StatusChange,
        updated_by: &str,
        policy: TransitionPolicy,
        now: DateTime<Utc>,
    ) -> Result<(Order, StatusHistoryEntry), OrderError> {
        policy.check(self.status, change.status)?;

        let timestamp = self.next_timestamp(now);
        let mut next = self.clone();
        next.status = change.status;
        next.updated_at = timestamp;

        let entry = StatusHistoryEntry::new(
            self.id,
            change.status,
            updated_by,
            Some(
                change
                    .reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TRANSITION_REASON.to_string()),
            ),
            change.notes.clone(),
            timestamp,
        );

        Ok((next, entry))
    }

    pub fn assign_courier(&self, courier_id: Uuid, now: DateTime<Utc>) -> Order {
        let mut next = self.clone();
        next.assigned_courier_id = Some(courier_id);
        next.updated_at = self.next_timestamp(now);
        next
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
