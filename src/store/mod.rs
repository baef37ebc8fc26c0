// ============================================================================
// Order Record Store - Persistence Collaborator
// ============================================================================
//
// The lifecycle manager only talks to these traits. Two implementations:
// - memory   - process-local maps, used by tests and the demo binary
// - postgres - relational store over sqlx
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::account::{Account, Email, Role};
use crate::domain::order::{Order, OrderFilter, OrderStatus, StatusHistoryEntry};

/// Unique key that rejected a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKey {
    TrackingCode,
    Email,
    Other(String),
}

impl std::fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKey::TrackingCode => f.write_str("tracking code"),
            ConflictKey::Email => f.write_str("email"),
            ConflictKey::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Duplicate {0}")]
    Conflict(ConflictKey),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or_default();
                let key = if constraint.contains("tracking_code") {
                    ConflictKey::TrackingCode
                } else if constraint.contains("email") {
                    ConflictKey::Email
                } else {
                    ConflictKey::Other(constraint.to_string())
                };
                return StoreError::Conflict(key);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn find_order_by_tracking_code(&self, code: &str) -> StoreResult<Option<Order>>;

    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    /// Insert an order together with the customer account it belongs to.
    /// Nothing is written unless both rows land.
    async fn insert_order_with_customer(&self, customer: Option<&Account>, order: &Order) -> StoreResult<()>;

    /// Overwrite an order and append its history entry in one write.
    /// Returns `false` when the order no longer exists.
    async fn save_order(&self, order: &Order, entry: Option<&StatusHistoryEntry>) -> StoreResult<bool>;

    /// Removes the order together with its history.
    async fn delete_order(&self, id: Uuid) -> StoreResult<bool>;

    async fn delete_all_orders(&self) -> StoreResult<u64>;

    /// History ordered oldest first.
    async fn list_history(&self, order_id: Uuid) -> StoreResult<Vec<StatusHistoryEntry>>;

    /// Matching orders, newest first.
    async fn filter_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    async fn orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>>;

    async fn count_orders(&self, status: Option<OrderStatus>) -> StoreResult<u64>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &Email) -> StoreResult<Option<Account>>;

    async fn insert_account(&self, account: &Account) -> StoreResult<()>;

    async fn count_accounts(&self, role: Role) -> StoreResult<u64>;
}
