use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use super::aggregate::Order;
use super::history::StatusHistoryEntry;
use super::lifecycle::{LifecycleError, LifecycleResult};
use super::value_objects::{GeoPoint, OrderStatus};
use crate::access::{AccessPolicy, Caller, Operation, RoleGuard};
use crate::domain::account::Account;
use crate::store::{AccountRepository, OrderRepository};

// ============================================================================
// Tracking Query Service - read-only projections by tracking code
// ============================================================================
//
// Both lookups return the same shape. The owner lookup answers NotFound for
// any caller that does not own the order, so existence never leaks.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&Account> for PartySummary {
    fn from(account: &Account) -> Self {
        Self {
            name: Some(account.name.clone()),
            email: Some(account.email.to_string()),
            phone: account.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub status: OrderStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub updated_by: String,
    pub timestamp: String,
}

impl From<StatusHistoryEntry> for HistoryView {
    fn from(entry: StatusHistoryEntry) -> Self {
        Self {
            status: entry.status,
            reason: entry.reason,
            notes: entry.notes,
            updated_by: entry.updated_by,
            timestamp: entry.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub tracking_code: String,
    pub status: OrderStatus,
    pub sender: PartySummary,
    pub recipient: PartySummary,
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
    pub created_at: String,
    pub updated_at: String,
    /// Courier detail is not projected yet; always null.
    pub assigned_courier: Option<PartySummary>,
    /// Most recent first.
    pub status_history: Vec<HistoryView>,
}

impl TrackingView {
    pub fn project(order: Order, customer: Option<&Account>, mut history: Vec<StatusHistoryEntry>) -> Self {
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let sender = customer.map(PartySummary::from).unwrap_or(PartySummary {
            name: None,
            email: None,
            phone: None,
        });

        let recipient = PartySummary {
            name: order.receiver.name,
            email: order.receiver.email,
            phone: order.receiver.phone,
        };

        Self {
            tracking_code: order.tracking_code.to_string(),
            status: order.status,
            sender,
            recipient,
            pickup_address: order.pickup_address,
            delivery_address: order.delivery_address,
            courier_service: order.courier_service,
            package_weight: order.package_weight,
            package_dimensions: order.package_dimensions,
            price: order.price,
            notes: order.notes,
            pickup_location: order.pickup_location,
            delivery_location: order.delivery_location,
            courier_location: order.courier_location,
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
            assigned_courier: None,
            status_history: history.into_iter().map(HistoryView::from).collect(),
        }
    }
}

pub struct TrackingService {
    orders: Arc<dyn OrderRepository>,
    accounts: Arc<dyn AccountRepository>,
    access: Arc<dyn AccessPolicy>,
}

impl TrackingService {
    pub fn new(orders: Arc<dyn OrderRepository>, accounts: Arc<dyn AccountRepository>) -> Self {
        Self {
            orders,
            accounts,
            access: Arc::new(RoleGuard),
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    /// Public lookup by tracking code.
    pub async fn track_by_code(&self, caller: &Caller, code: &str) -> LifecycleResult<TrackingView> {
        self.access.authorize(caller, Operation::TrackByCode)?;
        let order = self.order_by_code(code).await?;
        self.project(order).await
    }

    /// Same lookup, restricted to the order's own customer.
    pub async fn track_by_code_for_owner(&self, caller: &Caller, code: &str) -> LifecycleResult<TrackingView> {
        self.access.authorize(caller, Operation::TrackOwnOrder)?;
        let order = self.order_by_code(code).await?;
        if !owns(caller, &order) {
            tracing::debug!(tracking_code = %code, "Owner lookup by non-owner");
            return Err(LifecycleError::not_found("Order"));
        }
        self.project(order).await
    }

    async fn order_by_code(&self, code: &str) -> LifecycleResult<Order> {
        self.orders
            .find_order_by_tracking_code(code.trim())
            .await?
            .ok_or_else(|| LifecycleError::not_found("Order"))
    }

    async fn project(&self, order: Order) -> LifecycleResult<TrackingView> {
        let history = self.orders.list_history(order.id).await?;
        let customer = self.accounts.find_account(order.customer_id).await?;
        Ok(TrackingView::project(order, customer.as_ref(), history))
    }
}

fn owns(caller: &Caller, order: &Order) -> bool {
    caller.account_id() == Some(order.customer_id)
}
