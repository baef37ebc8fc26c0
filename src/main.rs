use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod access;
mod config;
mod domain;
mod fanout;
mod messaging;
mod metrics;
mod migration;
mod notifications;
mod store;
mod utils;

use access::Caller;
use config::{AppConfig, StoreBackend};
use domain::account::{Account, AccountStatus, Email, Role};
use domain::order::{
    OrderLifecycleManager, OrderPatch, OrderStatus, PublicOrderRequest, ReceiverContact, SenderContact,
    StatusChange, Topic, TrackingService,
};
use fanout::FanoutHub;
use messaging::RedpandaClient;
use notifications::{BestEffortNotifier, NoopDispatcher, NotificationDispatcher, RedpandaDispatcher};
use store::{AccountRepository, InMemoryStore, OrderRepository, PgStore, StoreError};
use utils::{retry_with_backoff, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_tracking=debug")),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        store = config.store_backend.as_str(),
        policy = ?config.transition_policy,
        notifications = config.redpanda_brokers.is_some(),
        "Starting courier tracking service"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 2. Store ===
    let (orders, accounts): (Arc<dyn OrderRepository>, Arc<dyn AccountRepository>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let store = Arc::new(connect_postgres(&config, &metrics).await?);
                (store.clone(), store)
            }
            StoreBackend::Memory => {
                let store = Arc::new(InMemoryStore::new());
                (store.clone(), store)
            }
        };

    if std::env::args().nth(1).as_deref() == Some("backfill-receivers") {
        let report = migration::backfill_receivers(orders.as_ref()).await?;
        tracing::info!(?report, "Migration complete");
        return Ok(());
    }

    // === 3. Notifications ===
    let dispatcher: Arc<dyn NotificationDispatcher> = match &config.redpanda_brokers {
        Some(brokers) => {
            let client = RedpandaClient::new(brokers, config.notification_timeout)?.with_metrics(metrics.clone());
            Arc::new(RedpandaDispatcher::new(Arc::new(client), config.notification_topic.clone()))
        }
        None => Arc::new(NoopDispatcher),
    };
    let notifier = BestEffortNotifier::new(dispatcher, config.notification_timeout, metrics.clone());

    // === 4. Metrics server ===
    let info = metrics::ServerInfo {
        store_backend: config.store_backend.as_str(),
        notifications: notifier.dispatcher_name(),
        started_at: Utc::now(),
    };
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let system = actix_web::rt::System::new();
        if let Err(e) = system.block_on(metrics::start_metrics_server(metrics_registry, info, metrics_port)) {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    // === 5. Lifecycle ===
    let hub = FanoutHub::with_metrics(metrics.clone());
    let lifecycle = OrderLifecycleManager::new(
        orders.clone(),
        accounts.clone(),
        Arc::new(hub.clone()),
        notifier,
        metrics.clone(),
    )
    .with_policy(config.transition_policy);
    let tracking = TrackingService::new(orders, accounts.clone());

    run_demo(&lifecycle, &tracking, &hub, accounts.as_ref()).await?;

    tracing::info!("Demo complete, serving metrics until Ctrl-C");
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn connect_postgres(config: &AppConfig, metrics: &metrics::Metrics) -> anyhow::Result<PgStore> {
    let retry = RetryConfig::with_attempts(config.startup_retry_attempts);
    let store = retry_with_backoff("postgres_connect", &retry, Some(metrics), |attempt| {
        tracing::info!(attempt, "Connecting to PostgreSQL");
        PgStore::connect(&config.database_url, config.database_max_connections)
    })
    .await?;
    store.ensure_schema().await?;
    Ok(store)
}

/// Account with the given email, created on first run.
async fn seed_account(accounts: &dyn AccountRepository, name: &str, email: &str, role: Role) -> anyhow::Result<Account> {
    let email = Email::parse(email)?;
    if let Some(existing) = accounts.find_account_by_email(&email).await? {
        return Ok(existing);
    }
    let account = Account {
        id: uuid::Uuid::new_v4(),
        name: name.to_string(),
        email,
        phone: None,
        role,
        status: AccountStatus::Active,
        location: None,
        zipcode: None,
        created_at: Utc::now(),
    };
    match accounts.insert_account(&account).await {
        Ok(()) => Ok(account),
        Err(StoreError::Conflict(_)) => accounts
            .find_account_by_email(&account.email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account {} vanished after conflict", account.email)),
        Err(e) => Err(e.into()),
    }
}

/// Walks one parcel from public booking to delivery.
async fn run_demo(
    lifecycle: &OrderLifecycleManager,
    tracking: &TrackingService,
    hub: &FanoutHub,
    accounts: &dyn AccountRepository,
) -> anyhow::Result<()> {
    let admin = seed_account(accounts, "Dispatch Admin", "admin@courier.local", Role::Admin).await?;
    let courier = seed_account(accounts, "Rider One", "rider@courier.local", Role::Courier).await?;
    let admin = Caller::admin(admin.id);

    let created = lifecycle
        .create_public_order(
            &Caller::Anonymous,
            PublicOrderRequest {
                sender: SenderContact {
                    name: Some("Amina Otieno".to_string()),
                    email: Some("amina@example.com".to_string()),
                    phone: Some("+254711000000".to_string()),
                    zipcode: Some("00100".to_string()),
                },
                pickup_address: "1 Kenyatta Ave, Nairobi".to_string(),
                delivery_address: "9 Moi Ave, Mombasa".to_string(),
                courier_service: "express".to_string(),
                package_weight: "2.5 kg".to_string(),
                package_dimensions: "20x15x10 cm".to_string(),
                price: Decimal::new(45000, 2),
                notes: Some("Fragile".to_string()),
                receiver: ReceiverContact {
                    name: Some("Baraka Mwangi".to_string()),
                    email: Some("baraka@example.com".to_string()),
                    phone: Some("+254722000000".to_string()),
                },
            },
        )
        .await?;
    let order = created.order;
    tracing::info!(tracking_code = %order.tracking_code, "{}", created.message);

    let mut watcher = hub.connect();
    watcher.join(Topic::Order(order.id));
    let watch = tokio::spawn(async move {
        while let Some(delivery) = watcher.recv().await {
            tracing::info!(topic = %delivery.topic, kind = delivery.event.kind(), "Subscriber received event");
        }
    });

    lifecycle.assign_courier(&admin, order.id, courier.id).await?;
    let courier = Caller::courier(courier.id);
    for status in [OrderStatus::Confirmed, OrderStatus::PickedUp, OrderStatus::InTransit] {
        lifecycle
            .transition_status(&courier, order.id, StatusChange::new(status))
            .await?;
    }
    lifecycle
        .update_order(
            &admin,
            order.id,
            OrderPatch {
                delivery_lat: Some(-4.0435),
                delivery_lng: Some(39.6682),
                status: Some(OrderStatus::OutForDelivery),
                status_reason: Some("Rider en route".to_string()),
                ..Default::default()
            },
        )
        .await?;
    lifecycle
        .transition_status(
            &courier,
            order.id,
            StatusChange::new(OrderStatus::Delivered).with_notes("Signed by receiver"),
        )
        .await?;

    let view = tracking
        .track_by_code(&Caller::Anonymous, order.tracking_code.as_str())
        .await?;
    tracing::info!(view = %serde_json::to_string_pretty(&view)?, "Tracking view");

    let sender = Caller::customer(order.customer_id);
    let own = tracking
        .track_by_code_for_owner(&sender, order.tracking_code.as_str())
        .await?;
    tracing::info!(status = %own.status, history = own.status_history.len(), "Sender's own tracking view");

    let stats = lifecycle.admin_stats(&admin).await?;
    tracing::info!(?stats, "Admin stats");

    // Let the subscriber drain before the demo ends.
    tokio::time::sleep(Duration::from_millis(100)).await;
    watch.abort();
    Ok(())
}
