use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountRepository, ConflictKey, OrderRepository, StoreError, StoreResult};
use crate::domain::account::{Account, Email, Role};
use crate::domain::order::{Order, OrderFilter, OrderStatus, StatusHistoryEntry};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<Uuid, Order>,
    history: HashMap<Uuid, Vec<StatusHistoryEntry>>,
    accounts: HashMap<Uuid, Account>,
}

impl MemoryState {
    fn check_email_free(&self, email: &Email) -> StoreResult<()> {
        if self.accounts.values().any(|existing| &existing.email == email) {
            return Err(StoreError::Conflict(ConflictKey::Email));
        }
        Ok(())
    }
}

/// Process-local store. Each write holds the lock for its whole duration,
/// so an order and its history entry always land together.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_tracking_code(&self, code: &str) -> StoreResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| order.tracking_code.as_str() == code)
            .cloned())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.insert_order_with_customer(None, order).await
    }

    async fn insert_order_with_customer(&self, customer: Option<&Account>, order: &Order) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(customer) = customer {
            state.check_email_free(&customer.email)?;
        }
        if state
            .orders
            .values()
            .any(|existing| existing.tracking_code == order.tracking_code)
        {
            return Err(StoreError::Conflict(ConflictKey::TrackingCode));
        }
        if let Some(customer) = customer {
            state.accounts.insert(customer.id, customer.clone());
        }
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn save_order(&self, order: &Order, entry: Option<&StatusHistoryEntry>) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(slot) = state.orders.get_mut(&order.id) else {
            return Ok(false);
        };
        *slot = order.clone();
        if let Some(entry) = entry {
            state.history.entry(order.id).or_default().push(entry.clone());
        }
        Ok(true)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.history.remove(&id);
        Ok(state.orders.remove(&id).is_some())
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let count = state.orders.len() as u64;
        state.orders.clear();
        state.history.clear();
        Ok(count)
    }

    async fn list_history(&self, order_id: Uuid) -> StoreResult<Vec<StatusHistoryEntry>> {
        let state = self.state.read().await;
        let mut entries = state.history.get(&order_id).cloned().unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps.
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    async fn filter_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let matching = state
            .orders
            .values()
            .filter(|order| filter.matches(order.status, order.created_at))
            .cloned()
            .collect();
        Ok(newest_first(matching))
    }

    async fn orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let owned = state
            .orders
            .values()
            .filter(|order| order.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(newest_first(owned))
    }

    async fn count_orders(&self, status: Option<OrderStatus>) -> StoreResult<u64> {
        let state = self.state.read().await;
        let count = state
            .orders
            .values()
            .filter(|order| status.map_or(true, |wanted| order.status == wanted))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &Email) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|account| &account.email == email)
            .cloned())
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.check_email_free(&account.email)?;
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn count_accounts(&self, role: Role) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.accounts.values().filter(|a| a.role == role).count() as u64)
    }
}
