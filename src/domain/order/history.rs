use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::OrderStatus;

/// Actor recorded when a change is not attributable to an account.
pub const SYSTEM_ACTOR: &str = "system";

/// One append-only audit entry of an order's status trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub updated_by: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        order_id: Uuid,
        status: OrderStatus,
        updated_by: impl Into<String>,
        reason: Option<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            status,
            updated_by: updated_by.into(),
            reason,
            notes,
            created_at,
        }
    }
}
