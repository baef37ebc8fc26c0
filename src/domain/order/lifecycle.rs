use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::{NewOrder, OrderFilter, OrderPatch, PublicOrderRequest, StatusChange};
use super::errors::OrderError;
use super::events::{OrderUpdate, Topic};
use super::history::StatusHistoryEntry;
use super::value_objects::{OrderStatus, TrackingCode, TransitionPolicy};
use crate::access::{AccessDenied, AccessPolicy, Caller, Operation, RoleGuard};
use crate::domain::account::{Account, AccountError, Email, Role};
use crate::fanout::EventPublisher;
use crate::metrics::Metrics;
use crate::notifications::{BestEffortNotifier, Notice, Recipient};
use crate::store::{AccountRepository, ConflictKey, OrderRepository, StoreError};

/// Fresh tracking codes tried before a collision is reported as Conflict.
pub const MAX_TRACKING_CODE_ATTEMPTS: usize = 5;

// ============================================================================
// Order Lifecycle Manager - the write path
// ============================================================================
//
// Every mutating operation follows the same sequence:
//
//   authorize -> load -> apply (pure, on Order) -> persist order + history
//   -> publish fan-out event -> best-effort notifications -> respond
//
// Nothing after "persist" can fail the operation. There is no version check
// between load and persist: concurrent writers to one order race and the
// last write wins.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(#[from] AccessDenied),

    #[error("Storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl LifecycleError {
    pub fn not_found(what: &str) -> Self {
        LifecycleError::NotFound(format!("{} not found", what))
    }
}

impl From<OrderError> for LifecycleError {
    fn from(err: OrderError) -> Self {
        LifecycleError::InvalidRequest(err.to_string())
    }
}

impl From<AccountError> for LifecycleError {
    fn from(err: AccountError) -> Self {
        LifecycleError::InvalidRequest(err.to_string())
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => LifecycleError::Conflict(format!("Duplicate {}", key)),
            other => LifecycleError::Storage(other),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub message: String,
    pub order: Order,
}

impl OrderResponse {
    fn new(message: impl Into<String>, order: Order) -> Self {
        Self {
            message: message.into(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionResponse {
    pub message: String,
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrder {
    #[serde(flatten)]
    pub order: Order,
    pub status_history: Vec<StatusHistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_customers: u64,
    pub total_couriers: u64,
    pub total_orders: u64,
    pub pending_orders: u64,
    pub confirmed_orders: u64,
}

// ============================================================================
// Tracking Code Source
// ============================================================================

pub trait TrackingCodeSource: Send + Sync {
    fn next_code(&self) -> TrackingCode;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTrackingCodes;

impl TrackingCodeSource for RandomTrackingCodes {
    fn next_code(&self) -> TrackingCode {
        TrackingCode::generate()
    }
}

// ============================================================================
// Manager
// ============================================================================

pub struct OrderLifecycleManager {
    orders: Arc<dyn OrderRepository>,
    accounts: Arc<dyn AccountRepository>,
    publisher: Arc<dyn EventPublisher>,
    notifier: BestEffortNotifier,
    access: Arc<dyn AccessPolicy>,
    codes: Arc<dyn TrackingCodeSource>,
    policy: TransitionPolicy,
    metrics: Arc<Metrics>,
}

impl OrderLifecycleManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        accounts: Arc<dyn AccountRepository>,
        publisher: Arc<dyn EventPublisher>,
        notifier: BestEffortNotifier,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orders,
            accounts,
            publisher,
            notifier,
            access: Arc::new(RoleGuard),
            codes: Arc::new(RandomTrackingCodes),
            policy: TransitionPolicy::default(),
            metrics,
        }
    }

    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_access(mut self, access: Arc<dyn AccessPolicy>) -> Self {
        self.access = access;
        self
    }

    pub fn with_tracking_codes(mut self, codes: Arc<dyn TrackingCodeSource>) -> Self {
        self.codes = codes;
        self
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Time an operation and count its outcome.
    async fn observe<T, F>(&self, operation: Operation, work: F) -> LifecycleResult<T>
    where
        F: Future<Output = LifecycleResult<T>>,
    {
        let started = Instant::now();
        let result = work.await;
        self.metrics.record_operation(
            operation.as_str(),
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        if let Err(e) = &result {
            tracing::debug!(operation = %operation, error = %e, "Lifecycle operation rejected");
        }
        result
    }

    fn authorize(&self, caller: &Caller, operation: Operation) -> LifecycleResult<()> {
        self.access.authorize(caller, operation)?;
        Ok(())
    }

    async fn load_order(&self, order_id: Uuid) -> LifecycleResult<Order> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("Order"))
    }

    /// Persist a mutation of an existing order; a vanished order is NotFound.
    async fn commit(&self, order: &Order, entry: Option<&StatusHistoryEntry>) -> LifecycleResult<()> {
        if !self.orders.save_order(order, entry).await? {
            return Err(LifecycleError::not_found("Order"));
        }
        if let Some(entry) = entry {
            self.metrics.record_transition(entry.status.as_str());
        }
        Ok(())
    }

    /// Insert a new order, drawing a fresh tracking code on collision. A new
    /// customer account is written in the same unit as the order, so a failed
    /// insert leaves no account behind.
    async fn insert_with_fresh_code<F>(&self, new_customer: Option<&Account>, build: F) -> LifecycleResult<Order>
    where
        F: Fn(TrackingCode) -> Result<Order, OrderError>,
    {
        for attempt in 1..=MAX_TRACKING_CODE_ATTEMPTS {
            let order = build(self.codes.next_code())?;
            match self.orders.insert_order_with_customer(new_customer, &order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::Conflict(ConflictKey::TrackingCode)) => {
                    tracing::warn!(
                        tracking_code = %order.tracking_code,
                        attempt,
                        "Tracking code collision, regenerating"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::Conflict(
            "Could not allocate a unique tracking code".to_string(),
        ))
    }

    async fn customer_of(&self, order: &Order) -> Option<Account> {
        match self.accounts.find_account(order.customer_id).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Customer lookup for notification failed");
                None
            }
        }
    }

    /// Customer and receiver of an order as notification targets.
    async fn parties(&self, order: &Order) -> [Option<Recipient>; 2] {
        let customer = self.customer_of(order).await;
        [
            customer
                .as_ref()
                .and_then(|c| Recipient::from_contact(Some(c.name.as_str()), Some(c.email.as_str()))),
            Recipient::from_contact(order.receiver.name.as_deref(), order.receiver.email.as_deref()),
        ]
    }

    fn emit(&self, topic: Topic, event: OrderUpdate) {
        self.publisher.publish(topic, event);
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    /// Admin path: the customer must already exist, be a USER and be active.
    pub async fn create_order(&self, caller: &Caller, input: NewOrder) -> LifecycleResult<OrderResponse> {
        self.observe(Operation::CreateOrder, async {
            self.authorize(caller, Operation::CreateOrder)?;

            let customer = self
                .accounts
                .find_account(input.customer_id)
                .await?
                .ok_or_else(|| LifecycleError::not_found("Customer"))?;
            customer.ensure_active_customer()?;

            let now = Utc::now();
            let order = self
                .insert_with_fresh_code(None, |code| {
                    Order::create(customer.id, input.details.clone(), code, now)
                })
                .await?;

            tracing::info!(
                order_id = %order.id,
                tracking_code = %order.tracking_code,
                customer_id = %customer.id,
                "Order created"
            );
            self.emit(Topic::Order(order.id), OrderUpdate::Created { order: order.clone() });

            Ok(OrderResponse::new("Order created successfully", order))
        })
        .await
    }

    /// Public path: resolve or create the sender's customer account by email,
    /// then notify sender and receiver.
    pub async fn create_public_order(
        &self,
        caller: &Caller,
        request: PublicOrderRequest,
    ) -> LifecycleResult<OrderResponse> {
        self.observe(Operation::CreatePublicOrder, async {
            self.authorize(caller, Operation::CreatePublicOrder)?;

            let (sender, details) = request.into_parts()?;
            let raw_email = sender
                .email
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| LifecycleError::InvalidRequest("Customer email is required".to_string()))?;
            let email = Email::parse(raw_email)?;

            let now = Utc::now();
            let (customer, new_account) = match self.accounts.find_account_by_email(&email).await? {
                Some(existing) => (existing, false),
                None => {
                    let account = Account::new_customer(
                        sender.name.clone(),
                        email.clone(),
                        sender.phone.clone(),
                        Some(details.pickup_address.clone()),
                        sender.zipcode.clone(),
                        now,
                    );
                    (account, true)
                }
            };
            ensure_public_sender(&customer)?;

            let inserted = self
                .insert_with_fresh_code(new_account.then_some(&customer), |code| {
                    Order::create(customer.id, details.clone(), code, now)
                })
                .await;
            let (customer, order) = match inserted {
                Ok(order) => {
                    if new_account {
                        tracing::info!(account_id = %customer.id, "Customer account created from public order");
                    }
                    (customer, order)
                }
                // Another request registered the same email first.
                Err(err @ LifecycleError::Conflict(_)) if new_account => {
                    let Some(existing) = self.accounts.find_account_by_email(&email).await? else {
                        return Err(err);
                    };
                    ensure_public_sender(&existing)?;
                    let order = self
                        .insert_with_fresh_code(None, |code| {
                            Order::create(existing.id, details.clone(), code, now)
                        })
                        .await?;
                    (existing, order)
                }
                Err(err) => return Err(err),
            };

            tracing::info!(
                order_id = %order.id,
                tracking_code = %order.tracking_code,
                customer_id = %customer.id,
                "Public order created"
            );
            self.emit(Topic::Order(order.id), OrderUpdate::Created { order: order.clone() });

            let sender_to = Recipient::from_contact(Some(customer.name.as_str()), Some(customer.email.as_str()));
            let receiver_to =
                Recipient::from_contact(order.receiver.name.as_deref(), order.receiver.email.as_deref());
            futures_util::future::join(
                self.notifier.notify(&order, Notice::OrderCreatedSender, [sender_to]),
                self.notifier.notify(
                    &order,
                    Notice::OrderCreatedRecipient {
                        sender_name: Some(customer.name.clone()),
                    },
                    [receiver_to],
                ),
            )
            .await;

            Ok(OrderResponse::new("Order created successfully", order))
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Update & Transition
    // ------------------------------------------------------------------------

    pub async fn update_order(
        &self,
        caller: &Caller,
        order_id: Uuid,
        patch: OrderPatch,
    ) -> LifecycleResult<OrderResponse> {
        self.observe(Operation::UpdateOrder, async {
            self.authorize(caller, Operation::UpdateOrder)?;

            let current = self.load_order(order_id).await?;
            let outcome = current.apply_patch(&patch, self.policy, Utc::now())?;
            self.commit(&outcome.order, outcome.history.as_ref()).await?;

            let order = outcome.order;
            tracing::info!(
                order_id = %order.id,
                status = ?order.status,
                status_changed = outcome.history.is_some(),
                "Order updated"
            );
            self.emit(Topic::Order(order.id), OrderUpdate::Updated { order: order.clone() });

            if outcome.delivery_location_changed && order.delivery_location.is_some() {
                let parties = self.parties(&order).await;
                self.notifier.notify(&order, Notice::LocationUpdated, parties).await;
            }

            Ok(OrderResponse::new("Order updated successfully", order))
        })
        .await
    }

    pub async fn transition_status(
        &self,
        caller: &Caller,
        order_id: Uuid,
        change: StatusChange,
    ) -> LifecycleResult<OrderResponse> {
        self.observe(Operation::TransitionStatus, async {
            self.authorize(caller, Operation::TransitionStatus)?;

            let current = self.load_order(order_id).await?;
            let (order, entry) = current.transition(&change, &caller.actor(), self.policy, Utc::now())?;
            self.commit(&order, Some(&entry)).await?;

            tracing::info!(
                order_id = %order.id,
                from = ?current.status,
                to = ?order.status,
                updated_by = %entry.updated_by,
                "Order status changed"
            );
            self.emit(Topic::Order(order.id), OrderUpdate::StatusChanged { status: order.status });

            let parties = self.parties(&order).await;
            self.notifier
                .notify(
                    &order,
                    Notice::StatusChanged {
                        reason: change.reason.clone(),
                    },
                    parties,
                )
                .await;

            Ok(OrderResponse::new(format!("Order status updated to {}", order.status), order))
        })
        .await
    }

    pub async fn assign_courier(
        &self,
        caller: &Caller,
        order_id: Uuid,
        courier_id: Uuid,
    ) -> LifecycleResult<OrderResponse> {
        self.observe(Operation::AssignCourier, async {
            self.authorize(caller, Operation::AssignCourier)?;

            let current = self.load_order(order_id).await?;
            let courier = self
                .accounts
                .find_account(courier_id)
                .await?
                .ok_or_else(|| LifecycleError::not_found("Courier"))?;
            if courier.role != Role::Courier {
                return Err(LifecycleError::InvalidRequest(
                    "Invalid or unauthorized courier".to_string(),
                ));
            }

            let order = current.assign_courier(courier.id, Utc::now());
            self.commit(&order, None).await?;

            tracing::info!(order_id = %order.id, courier_id = %courier.id, "Courier assigned");
            self.emit(
                Topic::Order(order.id),
                OrderUpdate::CourierAssigned { courier_id: courier.id },
            );

            self.notifier
                .notify(
                    &order,
                    Notice::CourierAssigned {
                        courier_name: courier.name.clone(),
                    },
                    [Recipient::from_contact(Some(courier.name.as_str()), Some(courier.email.as_str()))],
                )
                .await;

            Ok(OrderResponse::new("Courier assigned successfully", order))
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    pub async fn delete_order(&self, caller: &Caller, order_id: Uuid) -> LifecycleResult<DeletionResponse> {
        self.observe(Operation::DeleteOrder, async {
            self.authorize(caller, Operation::DeleteOrder)?;

            if !self.orders.delete_order(order_id).await? {
                return Err(LifecycleError::not_found("Order"));
            }

            tracing::info!(order_id = %order_id, "Order deleted");
            self.emit(Topic::Order(order_id), OrderUpdate::Deleted { order_id });

            Ok(DeletionResponse {
                message: "Order deleted successfully".to_string(),
                deleted_count: 1,
            })
        })
        .await
    }

    pub async fn delete_all_orders(&self, caller: &Caller) -> LifecycleResult<DeletionResponse> {
        self.observe(Operation::DeleteAllOrders, async {
            self.authorize(caller, Operation::DeleteAllOrders)?;

            let count = self.orders.delete_all_orders().await?;

            tracing::info!(count, "All orders deleted");
            self.emit(Topic::All, OrderUpdate::AllDeleted { count });

            Ok(DeletionResponse {
                message: format!(
                    "All orders deleted successfully. {} orders were deleted.",
                    count
                ),
                deleted_count: count,
            })
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn filter_orders(&self, caller: &Caller, filter: OrderFilter) -> LifecycleResult<Vec<Order>> {
        self.observe(Operation::FilterOrders, async {
            self.authorize(caller, Operation::FilterOrders)?;
            Ok(self.orders.filter_orders(&filter).await?)
        })
        .await
    }

    pub async fn list_orders(&self, caller: &Caller) -> LifecycleResult<Vec<Order>> {
        self.observe(Operation::ListOrders, async {
            self.authorize(caller, Operation::ListOrders)?;
            Ok(self.orders.filter_orders(&OrderFilter::default()).await?)
        })
        .await
    }

    pub async fn find_order(&self, caller: &Caller, order_id: Uuid) -> LifecycleResult<Order> {
        self.observe(Operation::FindOrder, async {
            self.authorize(caller, Operation::FindOrder)?;
            self.load_order(order_id).await
        })
        .await
    }

    /// A customer sees only their own orders; an admin may ask for anyone's.
    pub async fn orders_for_customer(
        &self,
        caller: &Caller,
        customer_id: Uuid,
    ) -> LifecycleResult<Vec<CustomerOrder>> {
        self.observe(Operation::OrdersForCustomer, async {
            self.authorize(caller, Operation::OrdersForCustomer)?;
            if caller.role() == Some(Role::User) && caller.account_id() != Some(customer_id) {
                return Err(AccessDenied::NotOwner(Operation::OrdersForCustomer).into());
            }

            let orders = self.orders.orders_for_customer(customer_id).await?;
            let mut result = Vec::with_capacity(orders.len());
            for order in orders {
                let status_history = self.orders.list_history(order.id).await?;
                result.push(CustomerOrder { order, status_history });
            }
            Ok(result)
        })
        .await
    }

    /// Oldest first. An order with no history yet is NotFound.
    pub async fn status_history(&self, caller: &Caller, order_id: Uuid) -> LifecycleResult<Vec<StatusHistoryEntry>> {
        self.observe(Operation::StatusHistory, async {
            self.authorize(caller, Operation::StatusHistory)?;
            if caller.role() == Some(Role::User) {
                let order = self.load_order(order_id).await?;
                if caller.account_id() != Some(order.customer_id) {
                    return Err(LifecycleError::not_found("Order"));
                }
            }

            let history = self.orders.list_history(order_id).await?;
            if history.is_empty() {
                return Err(LifecycleError::NotFound(
                    "No status history for this order".to_string(),
                ));
            }
            Ok(history)
        })
        .await
    }

    pub async fn admin_stats(&self, caller: &Caller) -> LifecycleResult<AdminStats> {
        self.observe(Operation::AdminStats, async {
            self.authorize(caller, Operation::AdminStats)?;
            let (customers, couriers, orders, pending, confirmed) = futures_util::try_join!(
                self.accounts.count_accounts(Role::User),
                self.accounts.count_accounts(Role::Courier),
                self.orders.count_orders(None),
                self.orders.count_orders(Some(OrderStatus::Pending)),
                self.orders.count_orders(Some(OrderStatus::Confirmed)),
            )?;
            Ok(AdminStats {
                total_customers: customers,
                total_couriers: couriers,
                total_orders: orders,
                pending_orders: pending,
                confirmed_orders: confirmed,
            })
        })
        .await
    }
}

fn ensure_public_sender(account: &Account) -> LifecycleResult<()> {
    if account.role != Role::User {
        return Err(LifecycleError::Conflict(
            "Email is registered to a non-customer account".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::account::aggregate::tests::account;
    use crate::domain::order::aggregate::tests::sample_details;
    use crate::domain::order::commands::SenderContact;
    use crate::domain::order::value_objects::{GeoPoint, ReceiverContact};
    use crate::fanout::{FanoutHub, Subscriber};
    use crate::notifications::testing::{FailingDispatcher, RecordingDispatcher};
    use crate::notifications::NotificationDispatcher;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) struct Harness {
        pub(crate) manager: OrderLifecycleManager,
        pub(crate) store: Arc<InMemoryStore>,
        pub(crate) hub: FanoutHub,
        pub(crate) metrics: Arc<Metrics>,
        pub(crate) admin: Caller,
        pub(crate) customer: Account,
        pub(crate) courier: Account,
    }

    pub(crate) async fn harness_with(dispatcher: Arc<dyn NotificationDispatcher>) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let hub = FanoutHub::with_metrics(metrics.clone());
        let notifier = BestEffortNotifier::new(dispatcher, Duration::from_millis(200), metrics.clone());

        let admin = account(Role::Admin, "admin@courier.test");
        let customer = account(Role::User, "customer@courier.test");
        let courier = account(Role::Courier, "rider@courier.test");
        for a in [&admin, &customer, &courier] {
            store.insert_account(a).await.unwrap();
        }

        let manager = OrderLifecycleManager::new(
            store.clone(),
            store.clone(),
            Arc::new(hub.clone()),
            notifier,
            metrics.clone(),
        );

        Harness {
            manager,
            store,
            hub,
            metrics,
            admin: Caller::admin(admin.id),
            customer,
            courier,
        }
    }

    async fn harness() -> (Harness, Arc<RecordingDispatcher>) {
        let recording = Arc::new(RecordingDispatcher::default());
        (harness_with(recording.clone()).await, recording)
    }

    impl Harness {
        pub(crate) async fn admin_order(&self) -> Order {
            self.manager
                .create_order(
                    &self.admin,
                    NewOrder {
                        customer_id: self.customer.id,
                        details: sample_details(),
                    },
                )
                .await
                .unwrap()
                .order
        }

        fn watch(&self, topic: Topic) -> Subscriber {
            let subscriber = self.hub.connect();
            subscriber.join(topic);
            subscriber
        }
    }

    fn public_request(email: &str) -> PublicOrderRequest {
        PublicOrderRequest {
            sender: SenderContact {
                name: None,
                email: Some(email.to_string()),
                phone: Some("+254711000000".to_string()),
                zipcode: Some("00100".to_string()),
            },
            pickup_address: "1 Kenyatta Ave, Nairobi".to_string(),
            delivery_address: "9 Moi Ave, Mombasa".to_string(),
            courier_service: "express".to_string(),
            package_weight: "2.5 kg".to_string(),
            package_dimensions: "20x15x10 cm".to_string(),
            price: Decimal::new(45000, 2),
            notes: None,
            receiver: ReceiverContact {
                name: Some("Bo".to_string()),
                email: Some("bo@x.com".to_string()),
                phone: None,
            },
        }
    }

    fn assert_tracking_code(code: &TrackingCode) {
        let suffix = code.as_str().strip_prefix(TrackingCode::PREFIX).unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_public_order_creates_customer_and_notifies() {
        let (h, recording) = harness().await;
        let mut all_events = h.hub.connect();

        let response = h
            .manager
            .create_public_order(&Caller::Anonymous, public_request("a@x.com"))
            .await
            .unwrap();
        let order = response.order;

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.package_weight, 2.5);
        assert_tracking_code(&order.tracking_code);

        let customer = h
            .store
            .find_account_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.id, order.customer_id);
        assert_eq!(customer.name, "Unknown User");
        assert_eq!(customer.role, Role::User);

        let mut kinds = recording.sent_kinds();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("order_created_recipient", "bo@x.com".to_string()),
                ("order_created_sender", "a@x.com".to_string()),
            ]
        );

        // Subscribers joined after the fact see nothing: no replay.
        all_events.join(Topic::Order(order.id));
        assert!(all_events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_public_order_emits_created_event() {
        let (h, _) = harness().await;
        let order = h
            .manager
            .create_public_order(&Caller::Anonymous, public_request("a@x.com"))
            .await
            .unwrap()
            .order;

        // Nobody can have joined the new order's topic yet, so the single
        // created event is published and dropped.
        let created = |outcome: &str| {
            h.metrics
                .fanout_events
                .with_label_values(&["created", outcome])
                .get()
        };
        assert_eq!(created("dropped"), 1);
        assert_eq!(created("delivered"), 0);
        assert!(h.store.list_history(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_order_reuses_existing_customer() {
        let (h, _) = harness().await;
        let order = h
            .manager
            .create_public_order(&Caller::Anonymous, public_request("CUSTOMER@courier.test"))
            .await
            .unwrap()
            .order;
        assert_eq!(order.customer_id, h.customer.id);
    }

    #[tokio::test]
    async fn test_public_order_requires_email() {
        let (h, _) = harness().await;
        let mut request = public_request("a@x.com");
        request.sender.email = None;

        let err = h
            .manager
            .create_public_order(&Caller::Anonymous, request)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(msg) if msg == "Customer email is required"));
    }

    #[tokio::test]
    async fn test_public_order_rejects_unparsable_weight() {
        let (h, _) = harness().await;
        let mut request = public_request("a@x.com");
        request.package_weight = "heavy".to_string();
        let err = h
            .manager
            .create_public_order(&Caller::Anonymous, request)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_public_order_with_courier_email_conflicts() {
        let (h, _) = harness().await;
        let err = h
            .manager
            .create_public_order(&Caller::Anonymous, public_request("rider@courier.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_public_order_survives_failing_dispatcher() {
        let h = harness_with(Arc::new(FailingDispatcher)).await;
        let response = h
            .manager
            .create_public_order(&Caller::Anonymous, public_request("a@x.com"))
            .await
            .unwrap();
        assert!(h.store.find_order(response.order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_admin_create_requires_admin() {
        let (h, _) = harness().await;
        let input = NewOrder {
            customer_id: h.customer.id,
            details: sample_details(),
        };
        let err = h
            .manager
            .create_order(&Caller::customer(h.customer.id), input)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_admin_create_requires_existing_customer() {
        let (h, _) = harness().await;
        let input = NewOrder {
            customer_id: Uuid::new_v4(),
            details: sample_details(),
        };
        let err = h.manager.create_order(&h.admin, input).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(msg) if msg == "Customer not found"));
    }

    #[tokio::test]
    async fn test_admin_create_rejects_non_customer() {
        let (h, _) = harness().await;
        let input = NewOrder {
            customer_id: h.courier.id,
            details: sample_details(),
        };
        let err = h.manager.create_order(&h.admin, input).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    /// Closes the public form.
    struct NoPublicOrders;

    impl AccessPolicy for NoPublicOrders {
        fn authorize(&self, caller: &Caller, operation: Operation) -> Result<(), AccessDenied> {
            if operation == Operation::CreatePublicOrder {
                return Err(AccessDenied::Unauthenticated(operation));
            }
            RoleGuard.authorize(caller, operation)
        }
    }

    #[tokio::test]
    async fn test_custom_access_policy_is_consulted() {
        let (h, recording) = harness().await;
        let manager = OrderLifecycleManager::new(
            h.store.clone(),
            h.store.clone(),
            Arc::new(h.hub.clone()),
            BestEffortNotifier::new(recording.clone(), Duration::from_millis(50), h.metrics.clone()),
            h.metrics.clone(),
        )
        .with_access(Arc::new(NoPublicOrders));

        let err = manager
            .create_public_order(&Caller::Anonymous, public_request("a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
        assert!(h.manager.list_orders(&h.admin).await.unwrap().is_empty());
        assert!(recording.sent().is_empty());
    }

    #[tokio::test]
    async fn test_admin_create_sends_no_mail() {
        let (h, recording) = harness().await;
        h.admin_order().await;
        assert!(recording.sent().is_empty());
    }

    struct SequenceCodes {
        codes: Mutex<Vec<TrackingCode>>,
    }

    impl SequenceCodes {
        fn new(codes: &[&str]) -> Self {
            Self {
                codes: Mutex::new(codes.iter().rev().map(|c| TrackingCode::new(*c)).collect()),
            }
        }
    }

    impl TrackingCodeSource for SequenceCodes {
        fn next_code(&self) -> TrackingCode {
            self.codes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(TrackingCode::generate)
        }
    }

    #[tokio::test]
    async fn test_tracking_code_collision_regenerates() {
        let (h, _) = harness().await;
        let manager = OrderLifecycleManager::new(
            h.store.clone(),
            h.store.clone(),
            Arc::new(FanoutHub::new()),
            BestEffortNotifier::new(
                Arc::new(RecordingDispatcher::default()),
                Duration::from_millis(50),
                Arc::new(Metrics::new().unwrap()),
            ),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_tracking_codes(Arc::new(SequenceCodes::new(&[
            "PRC-AAAAAAAA",
            "PRC-AAAAAAAA",
            "PRC-BBBBBBBB",
        ])));

        let input = || NewOrder {
            customer_id: h.customer.id,
            details: sample_details(),
        };
        let first = manager.create_order(&h.admin, input()).await.unwrap().order;
        let second = manager.create_order(&h.admin, input()).await.unwrap().order;

        assert_eq!(first.tracking_code.as_str(), "PRC-AAAAAAAA");
        assert_eq!(second.tracking_code.as_str(), "PRC-BBBBBBBB");
    }

    #[tokio::test]
    async fn test_tracking_code_exhaustion_is_conflict() {
        let (h, _) = harness().await;
        let same = ["PRC-CCCCCCCC"; MAX_TRACKING_CODE_ATTEMPTS + 1];
        let manager = OrderLifecycleManager::new(
            h.store.clone(),
            h.store.clone(),
            Arc::new(FanoutHub::new()),
            BestEffortNotifier::new(
                Arc::new(RecordingDispatcher::default()),
                Duration::from_millis(50),
                Arc::new(Metrics::new().unwrap()),
            ),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_tracking_codes(Arc::new(SequenceCodes::new(&same)));

        let input = || NewOrder {
            customer_id: h.customer.id,
            details: sample_details(),
        };
        manager.create_order(&h.admin, input()).await.unwrap();
        let err = manager.create_order(&h.admin, input()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_public_order_code_exhaustion_leaves_no_account() {
        let (h, _) = harness().await;
        let same = ["PRC-DEADBEEF"; MAX_TRACKING_CODE_ATTEMPTS + 1];
        let manager = OrderLifecycleManager::new(
            h.store.clone(),
            h.store.clone(),
            Arc::new(FanoutHub::new()),
            BestEffortNotifier::new(
                Arc::new(RecordingDispatcher::default()),
                Duration::from_millis(50),
                Arc::new(Metrics::new().unwrap()),
            ),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_tracking_codes(Arc::new(SequenceCodes::new(&same)));

        manager
            .create_order(
                &h.admin,
                NewOrder {
                    customer_id: h.customer.id,
                    details: sample_details(),
                },
            )
            .await
            .unwrap();

        let err = manager
            .create_public_order(&Caller::Anonymous, public_request("new@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Conflict(ref msg) if msg == "Could not allocate a unique tracking code"));

        let account = h
            .store
            .find_account_by_email(&Email::parse("new@x.com").unwrap())
            .await
            .unwrap();
        assert!(account.is_none());
        assert_eq!(h.store.count_accounts(Role::User).await.unwrap(), 1);
    }

    // ------------------------------------------------------------------------
    // Transition
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_transition_records_history_and_emits() {
        let (h, recording) = harness().await;
        let order = h.admin_order().await;
        let mut watcher = h.watch(Topic::Order(order.id));
        let admin_id = h.admin.account_id().unwrap();

        let response = h
            .manager
            .transition_status(
                &h.admin,
                order.id,
                StatusChange::new(OrderStatus::Confirmed).with_reason("stock ok"),
            )
            .await
            .unwrap();

        assert_eq!(response.order.status, OrderStatus::Confirmed);
        assert_eq!(response.message, "Order status updated to CONFIRMED");

        let history = h.store.list_history(order.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, OrderStatus::Confirmed);
        assert_eq!(history[0].updated_by, admin_id.to_string());
        assert_eq!(history[0].reason.as_deref(), Some("stock ok"));

        let delivery = watcher.try_recv().unwrap();
        assert_eq!(
            delivery.event,
            OrderUpdate::StatusChanged {
                status: OrderStatus::Confirmed
            }
        );
        let json = serde_json::to_value(&delivery.event).unwrap();
        assert_eq!(json["status"], "CONFIRMED");

        // Customer and receiver both get the status mail.
        let kinds = recording.sent_kinds();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.iter().all(|(kind, _)| *kind == "status_changed"));
    }

    #[tokio::test]
    async fn test_status_always_matches_latest_history() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        let courier = Caller::courier(h.courier.id);

        for status in [OrderStatus::Confirmed, OrderStatus::PickedUp, OrderStatus::InTransit] {
            h.manager
                .transition_status(&courier, order.id, StatusChange::new(status))
                .await
                .unwrap();
        }
        h.manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    status: Some(OrderStatus::OutForDelivery),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = h.store.find_order(order.id).await.unwrap().unwrap();
        let history = h.store.list_history(order.id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.last().unwrap().status, stored.status);
        assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_transition_survives_failing_dispatcher() {
        let h = harness_with(Arc::new(FailingDispatcher)).await;
        let order = h.admin_order().await;

        h.manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();

        let stored = h
            .store
            .find_order_by_tracking_code(order.tracking_code.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert_eq!(h.store.list_history(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_locked_by_default() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Cancelled))
            .await
            .unwrap();

        let err = h
            .manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
        assert_eq!(h.store.list_history(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_permissive_policy_revives_cancelled_order() {
        let (h, _) = harness().await;
        let manager = OrderLifecycleManager::new(
            h.store.clone(),
            h.store.clone(),
            Arc::new(FanoutHub::new()),
            BestEffortNotifier::new(
                Arc::new(RecordingDispatcher::default()),
                Duration::from_millis(50),
                Arc::new(Metrics::new().unwrap()),
            ),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_policy(TransitionPolicy::Permissive);
        let order = h.admin_order().await;

        for status in [OrderStatus::Cancelled, OrderStatus::Pending] {
            manager
                .transition_status(&h.admin, order.id, StatusChange::new(status))
                .await
                .unwrap();
        }
        let stored = h.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_customer_cannot_transition() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        let err = h
            .manager
            .transition_status(
                &Caller::customer(h.customer.id),
                order.id,
                StatusChange::new(OrderStatus::Delivered),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_transition_unknown_order_is_not_found() {
        let (h, _) = harness().await;
        let err = h
            .manager
            .transition_status(&h.admin, Uuid::new_v4(), StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delivery_move_notifies_both_parties() {
        let (h, recording) = harness().await;
        let order = h.admin_order().await;
        let mut watcher = h.watch(Topic::Order(order.id));

        let response = h
            .manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    delivery_lat: Some(1.0),
                    delivery_lng: Some(2.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(response.order.delivery_location, Some(GeoPoint::new(1.0, 2.0)));
        assert_eq!(response.order.pickup_address, order.pickup_address);

        let mut kinds = recording.sent_kinds();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("location_updated", "bo@example.com".to_string()),
                ("location_updated", "customer@courier.test".to_string()),
            ]
        );

        match watcher.try_recv().unwrap().event {
            OrderUpdate::Updated { order: updated } => assert_eq!(updated, response.order),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delivery_move_skips_receiver_without_email() {
        let (h, recording) = harness().await;
        let mut details = sample_details();
        details.receiver.email = None;
        let order = h
            .manager
            .create_order(
                &h.admin,
                NewOrder {
                    customer_id: h.customer.id,
                    details,
                },
            )
            .await
            .unwrap()
            .order;

        h.manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    delivery_lat: Some(-1.28),
                    delivery_lng: Some(36.82),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            recording.sent_kinds(),
            vec![("location_updated", "customer@courier.test".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_without_location_change_sends_nothing() {
        let (h, recording) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    notes: Some("Fragile".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(recording.sent().is_empty());
        assert!(h.store.list_history(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_half_coordinate() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        let err = h
            .manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    delivery_lat: Some(1.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_update_status_uses_default_reason() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    status: Some(OrderStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let history = h.store.list_history(order.id).await.unwrap();
        assert_eq!(history[0].reason.as_deref(), Some("Status updated"));
        assert_eq!(history[0].updated_by, "system");
    }

    /// Serves reads from a snapshot taken before a concurrent write landed.
    struct StaleReads {
        inner: Arc<InMemoryStore>,
        snapshot: Mutex<Option<Order>>,
    }

    #[async_trait]
    impl OrderRepository for StaleReads {
        async fn find_order(&self, id: Uuid) -> crate::store::StoreResult<Option<Order>> {
            let snapshot = self.snapshot.lock().unwrap().clone();
            match snapshot {
                Some(order) if order.id == id => Ok(Some(order)),
                _ => self.inner.find_order(id).await,
            }
        }
        async fn find_order_by_tracking_code(&self, code: &str) -> crate::store::StoreResult<Option<Order>> {
            self.inner.find_order_by_tracking_code(code).await
        }
        async fn insert_order(&self, order: &Order) -> crate::store::StoreResult<()> {
            self.inner.insert_order(order).await
        }
        async fn insert_order_with_customer(
            &self,
            customer: Option<&Account>,
            order: &Order,
        ) -> crate::store::StoreResult<()> {
            self.inner.insert_order_with_customer(customer, order).await
        }
        async fn save_order(
            &self,
            order: &Order,
            entry: Option<&StatusHistoryEntry>,
        ) -> crate::store::StoreResult<bool> {
            self.inner.save_order(order, entry).await
        }
        async fn delete_order(&self, id: Uuid) -> crate::store::StoreResult<bool> {
            self.inner.delete_order(id).await
        }
        async fn delete_all_orders(&self) -> crate::store::StoreResult<u64> {
            self.inner.delete_all_orders().await
        }
        async fn list_history(&self, order_id: Uuid) -> crate::store::StoreResult<Vec<StatusHistoryEntry>> {
            self.inner.list_history(order_id).await
        }
        async fn filter_orders(&self, filter: &OrderFilter) -> crate::store::StoreResult<Vec<Order>> {
            self.inner.filter_orders(filter).await
        }
        async fn orders_for_customer(&self, customer_id: Uuid) -> crate::store::StoreResult<Vec<Order>> {
            self.inner.orders_for_customer(customer_id).await
        }
        async fn count_orders(&self, status: Option<OrderStatus>) -> crate::store::StoreResult<u64> {
            self.inner.count_orders(status).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_last_writer_wins() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;

        let stale = Arc::new(StaleReads {
            inner: h.store.clone(),
            snapshot: Mutex::new(Some(order.clone())),
        });
        let racing = OrderLifecycleManager::new(
            stale,
            h.store.clone(),
            Arc::new(FanoutHub::new()),
            BestEffortNotifier::new(
                Arc::new(RecordingDispatcher::default()),
                Duration::from_millis(50),
                Arc::new(Metrics::new().unwrap()),
            ),
            Arc::new(Metrics::new().unwrap()),
        );

        // Writer A commits a new address.
        h.manager
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    delivery_address: Some("12 Digo Rd, Mombasa".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Writer B read the order before A committed and saves after it.
        racing
            .update_order(
                &h.admin,
                order.id,
                OrderPatch {
                    notes: Some("Call on arrival".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = h.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("Call on arrival"));
        // A's change is lost: no version check guards the read-modify-write.
        assert_eq!(stored.delivery_address, order.delivery_address);
    }

    // ------------------------------------------------------------------------
    // Assign
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_assign_courier_sets_reference_and_notifies() {
        let (h, recording) = harness().await;
        let order = h.admin_order().await;
        let mut watcher = h.watch(Topic::Order(order.id));

        let response = h
            .manager
            .assign_courier(&h.admin, order.id, h.courier.id)
            .await
            .unwrap();

        assert_eq!(response.order.assigned_courier_id, Some(h.courier.id));
        assert_eq!(
            watcher.try_recv().unwrap().event,
            OrderUpdate::CourierAssigned {
                courier_id: h.courier.id
            }
        );
        assert_eq!(
            recording.sent_kinds(),
            vec![("courier_assigned", "rider@courier.test".to_string())]
        );
    }

    #[tokio::test]
    async fn test_assign_non_courier_rejected() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        let mut watcher = h.watch(Topic::Order(order.id));

        let err = h
            .manager
            .assign_courier(&h.admin, order.id, h.customer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidRequest(_)));

        let stored = h.store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_courier_id, None);
        assert!(watcher.try_recv().is_none());

        let err = h
            .manager
            .assign_courier(&h.admin, order.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(msg) if msg == "Courier not found"));
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_delete_removes_history_and_emits() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();
        let mut watcher = h.watch(Topic::Order(order.id));

        let response = h.manager.delete_order(&h.admin, order.id).await.unwrap();
        assert_eq!(response.deleted_count, 1);
        assert!(h.store.list_history(order.id).await.unwrap().is_empty());
        assert_eq!(
            watcher.try_recv().unwrap().event,
            OrderUpdate::Deleted { order_id: order.id }
        );

        let err = h.manager.delete_order(&h.admin, order.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_all_broadcasts_on_all_topic() {
        let (h, _) = harness().await;
        for _ in 0..12 {
            h.admin_order().await;
        }
        let mut watcher = h.watch(Topic::All);

        let response = h.manager.delete_all_orders(&h.admin).await.unwrap();
        assert_eq!(response.deleted_count, 12);

        let delivery = watcher.try_recv().unwrap();
        assert_eq!(delivery.topic, Topic::All);
        assert_eq!(
            serde_json::to_value(&delivery.event).unwrap(),
            serde_json::json!({ "type": "all_deleted", "count": 12 })
        );
        assert!(h
            .manager
            .filter_orders(&h.admin, OrderFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_filter_by_status() {
        let (h, _) = harness().await;
        let confirmed = h.admin_order().await;
        h.admin_order().await;
        h.manager
            .transition_status(&h.admin, confirmed.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();

        let found = h
            .manager
            .filter_orders(
                &h.admin,
                OrderFilter {
                    status: Some(OrderStatus::Confirmed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, confirmed.id);
        assert_eq!(h.manager.list_orders(&h.admin).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_history_empty_is_not_found() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        let err = h.manager.status_history(&h.admin, order.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(msg) if msg == "No status history for this order"));
    }

    #[tokio::test]
    async fn test_status_history_hidden_from_other_customers() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();

        let own = h
            .manager
            .status_history(&Caller::customer(h.customer.id), order.id)
            .await
            .unwrap();
        assert_eq!(own.len(), 1);

        let err = h
            .manager
            .status_history(&Caller::customer(Uuid::new_v4()), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_orders_for_customer_includes_history() {
        let (h, _) = harness().await;
        let order = h.admin_order().await;
        h.manager
            .transition_status(&h.admin, order.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();

        let mine = h
            .manager
            .orders_for_customer(&Caller::customer(h.customer.id), h.customer.id)
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status_history.len(), 1);

        let err = h
            .manager
            .orders_for_customer(&Caller::customer(Uuid::new_v4()), h.customer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(AccessDenied::NotOwner(_))));
    }

    #[tokio::test]
    async fn test_admin_stats() {
        let (h, _) = harness().await;
        let first = h.admin_order().await;
        h.admin_order().await;
        h.manager
            .transition_status(&h.admin, first.id, StatusChange::new(OrderStatus::Confirmed))
            .await
            .unwrap();

        let stats = h.manager.admin_stats(&h.admin).await.unwrap();
        assert_eq!(
            stats,
            AdminStats {
                total_customers: 1,
                total_couriers: 1,
                total_orders: 2,
                pending_orders: 1,
                confirmed_orders: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_find_order_not_found() {
        let (h, _) = harness().await;
        let err = h.manager.find_order(&h.admin, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(msg) if msg == "Order not found"));
    }
}
