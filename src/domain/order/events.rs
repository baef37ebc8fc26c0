use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::aggregate::Order;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Lifecycle Events - pushed to subscribers, never stored
// ============================================================================

/// Lifecycle event emitted once per committed state-affecting operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrderUpdate {
    Created {
        order: Order,
    },
    Updated {
        order: Order,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        status: OrderStatus,
    },
    #[serde(rename_all = "camelCase")]
    CourierAssigned {
        courier_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        order_id: Uuid,
    },
    #[serde(rename = "all_deleted")]
    AllDeleted {
        count: u64,
    },
}

impl OrderUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            OrderUpdate::Created { .. } => "created",
            OrderUpdate::Updated { .. } => "updated",
            OrderUpdate::StatusChanged { .. } => "statusChanged",
            OrderUpdate::CourierAssigned { .. } => "courierAssigned",
            OrderUpdate::Deleted { .. } => "deleted",
            OrderUpdate::AllDeleted { .. } => "all_deleted",
        }
    }
}

/// Routing key for lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Order(Uuid),
    /// Reserved topic for events that are not scoped to one order.
    All,
}

impl Topic {
    pub const ALL: &'static str = "all";
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Order(id) => write!(f, "{}", id),
            Topic::All => f.write_str(Topic::ALL),
        }
    }
}
