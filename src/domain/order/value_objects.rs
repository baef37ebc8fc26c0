use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
    FailedDelivery,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
        OrderStatus::FailedDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::FailedDelivery => "FAILED_DELIVERY",
        }
    }

    /// Terminal statuses end the lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Returned
                | OrderStatus::FailedDelivery
        )
    }

    /// Position on the main delivery path, `None` for side branches.
    fn main_path_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::PickedUp => Some(2),
            OrderStatus::InTransit => Some(3),
            OrderStatus::OutForDelivery => Some(4),
            OrderStatus::Delivered => Some(5),
            OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::FailedDelivery => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Transition Policy
// ============================================================================

/// Which status changes the lifecycle accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may follow any status.
    Permissive,
    /// Terminal statuses accept no further transition.
    #[default]
    TerminalLocked,
    /// Terminal-locked, and the main delivery path only moves forward.
    Strict,
}

impl TransitionPolicy {
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::TerminalLocked => {
                if from.is_terminal() {
                    return Err(OrderError::TerminalStatus(from));
                }
                Ok(())
            }
            TransitionPolicy::Strict => {
                if from.is_terminal() {
                    return Err(OrderError::TerminalStatus(from));
                }
                match (from.main_path_rank(), to.main_path_rank()) {
                    (Some(current), Some(next)) if next <= current => {
                        Err(OrderError::InvalidStatusTransition { from, to })
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "terminal-locked" | "terminal_locked" => Ok(TransitionPolicy::TerminalLocked),
            "strict" => Ok(TransitionPolicy::Strict),
            other => Err(OrderError::UnknownPolicy(other.to_string())),
        }
    }
}

// ============================================================================
// Tracking Code
// ============================================================================

/// Public, human-shareable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(String);

impl TrackingCode {
    pub const PREFIX: &'static str = "PRC-";

    pub fn generate() -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", Self::PREFIX, token[..8].to_ascii_uppercase()))
    }

    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Coordinates & Contacts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Merge a partial coordinate update over an existing point.
    pub fn merge(
        existing: Option<GeoPoint>,
        lat: Option<f64>,
        lng: Option<f64>,
        field: &'static str,
    ) -> Result<Option<GeoPoint>, OrderError> {
        if lat.is_none() && lng.is_none() {
            return Ok(existing);
        }
        let lat = lat.or(existing.map(|p| p.lat));
        let lng = lng.or(existing.map(|p| p.lng));
        match (lat, lng) {
            (Some(lat), Some(lng)) => Ok(Some(GeoPoint::new(lat, lng))),
            _ => Err(OrderError::IncompleteCoordinates(field)),
        }
    }
}

/// Receiver details captured when the order is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ReceiverContact {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

/// Parse a free-text package weight such as `"2.5 kg"`.
pub fn parse_weight(raw: &str) -> Result<f64, OrderError> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    match digits.parse::<f64>() {
        Ok(weight) if weight.is_finite() && weight >= 0.0 => Ok(weight),
        _ => Err(OrderError::InvalidWeight(raw.to_string())),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
