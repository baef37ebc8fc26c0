use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{AccountRepository, OrderRepository, StoreError, StoreResult};
use crate::domain::account::{Account, Email, Role};
use crate::domain::order::{
    GeoPoint, Order, OrderFilter, OrderStatus, ReceiverContact, StatusHistoryEntry, TrackingCode,
};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Tables:
// - accounts        - customers, couriers and admins (email unique)
// - orders          - keyed by id, unique tracking_code
// - status_history  - FK to orders (cascade delete), indexed on (order_id, created_at)
//
// ============================================================================

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        phone TEXT,
        role TEXT NOT NULL,
        status TEXT NOT NULL,
        location TEXT,
        zipcode TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT accounts_email_key UNIQUE (email)
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        tracking_code TEXT NOT NULL,
        customer_id UUID NOT NULL REFERENCES accounts(id),
        receiver_name TEXT,
        receiver_email TEXT,
        receiver_phone TEXT,
        assigned_courier_id UUID REFERENCES accounts(id),
        pickup_address TEXT NOT NULL,
        delivery_address TEXT NOT NULL,
        courier_service TEXT NOT NULL,
        package_weight DOUBLE PRECISION NOT NULL,
        package_dimensions TEXT NOT NULL,
        price NUMERIC NOT NULL,
        notes TEXT,
        pickup_lat DOUBLE PRECISION,
        pickup_lng DOUBLE PRECISION,
        delivery_lat DOUBLE PRECISION,
        delivery_lng DOUBLE PRECISION,
        courier_lat DOUBLE PRECISION,
        courier_lng DOUBLE PRECISION,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT orders_tracking_code_key UNIQUE (tracking_code)
    )",
    "CREATE INDEX IF NOT EXISTS orders_status_created_idx ON orders (status, created_at DESC)",
    "CREATE TABLE IF NOT EXISTS status_history (
        id UUID PRIMARY KEY,
        seq BIGSERIAL NOT NULL,
        order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        updated_by TEXT NOT NULL,
        reason TEXT,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS status_history_order_created_idx ON status_history (order_id, created_at)",
    "CREATE INDEX IF NOT EXISTS orders_customer_idx ON orders (customer_id)",
];

const ORDER_COLUMNS: &str = "id, tracking_code, customer_id, receiver_name, receiver_email, \
    receiver_phone, assigned_courier_id, pickup_address, delivery_address, courier_service, \
    package_weight, package_dimensions, price, notes, pickup_lat, pickup_lng, delivery_lat, \
    delivery_lng, courier_lat, courier_lng, status, created_at, updated_at";

const ACCOUNT_COLUMNS: &str = "id, name, email, phone, role, status, location, zipcode, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they are missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = SCHEMA.len(), "Order store schema ready");
        Ok(())
    }
}

fn point(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    }
}

fn parse_column<T: std::str::FromStr>(column: &str, raw: &str) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", column, e)))
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        tracking_code: TrackingCode::new(row.try_get::<String, _>("tracking_code")?),
        customer_id: row.try_get("customer_id")?,
        receiver: ReceiverContact {
            name: row.try_get("receiver_name")?,
            email: row.try_get("receiver_email")?,
            phone: row.try_get("receiver_phone")?,
        },
        assigned_courier_id: row.try_get("assigned_courier_id")?,
        pickup_address: row.try_get("pickup_address")?,
        delivery_address: row.try_get("delivery_address")?,
        courier_service: row.try_get("courier_service")?,
        package_weight: row.try_get("package_weight")?,
        package_dimensions: row.try_get("package_dimensions")?,
        price: row.try_get::<Decimal, _>("price")?,
        notes: row.try_get("notes")?,
        pickup_location: point(row.try_get("pickup_lat")?, row.try_get("pickup_lng")?),
        delivery_location: point(row.try_get("delivery_lat")?, row.try_get("delivery_lng")?),
        courier_location: point(row.try_get("courier_lat")?, row.try_get("courier_lng")?),
        status: parse_column::<OrderStatus>("status", &status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn history_from_row(row: &PgRow) -> StoreResult<StatusHistoryEntry> {
    let status: String = row.try_get("status")?;
    Ok(StatusHistoryEntry {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        status: parse_column::<OrderStatus>("status", &status)?,
        updated_by: row.try_get("updated_by")?,
        reason: row.try_get("reason")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let email: String = row.try_get("email")?;
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: Email::parse(&email).map_err(|e| StoreError::Corrupt(format!("email: {}", e)))?,
        phone: row.try_get("phone")?,
        role: parse_column("role", &role)?,
        status: parse_column("status", &status)?,
        location: row.try_get("location")?,
        zipcode: row.try_get("zipcode")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_order_row<'e>(conn: impl PgExecutor<'e>, order: &Order) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO orders ({}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)",
        ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(order.tracking_code.as_str())
    .bind(order.customer_id)
    .bind(&order.receiver.name)
    .bind(&order.receiver.email)
    .bind(&order.receiver.phone)
    .bind(order.assigned_courier_id)
    .bind(&order.pickup_address)
    .bind(&order.delivery_address)
    .bind(&order.courier_service)
    .bind(order.package_weight)
    .bind(&order.package_dimensions)
    .bind(order.price)
    .bind(&order.notes)
    .bind(order.pickup_location.map(|p| p.lat))
    .bind(order.pickup_location.map(|p| p.lng))
    .bind(order.delivery_location.map(|p| p.lat))
    .bind(order.delivery_location.map(|p| p.lng))
    .bind(order.courier_location.map(|p| p.lat))
    .bind(order.courier_location.map(|p| p.lng))
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_account_row<'e>(conn: impl PgExecutor<'e>, account: &Account) -> StoreResult<()> {
    sqlx::query(&format!(
        "INSERT INTO accounts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        ACCOUNT_COLUMNS
    ))
    .bind(account.id)
    .bind(&account.name)
    .bind(account.email.as_str())
    .bind(&account.phone)
    .bind(account.role.as_str())
    .bind(account.status.as_str())
    .bind(&account.location)
    .bind(&account.zipcode)
    .bind(account.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_order_by_tracking_code(&self, code: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE tracking_code = $1",
            ORDER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        insert_order_row(&self.pool, order).await
    }

    async fn insert_order_with_customer(&self, customer: Option<&Account>, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if let Some(customer) = customer {
            insert_account_row(&mut *tx, customer).await?;
        }
        insert_order_row(&mut *tx, order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_order(&self, order: &Order, entry: Option<&StatusHistoryEntry>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET
                receiver_name = $2, receiver_email = $3, receiver_phone = $4,
                assigned_courier_id = $5, pickup_address = $6, delivery_address = $7,
                courier_service = $8, package_weight = $9, package_dimensions = $10,
                price = $11, notes = $12, pickup_lat = $13, pickup_lng = $14,
                delivery_lat = $15, delivery_lng = $16, courier_lat = $17, courier_lng = $18,
                status = $19, updated_at = $20
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(&order.receiver.name)
        .bind(&order.receiver.email)
        .bind(&order.receiver.phone)
        .bind(order.assigned_courier_id)
        .bind(&order.pickup_address)
        .bind(&order.delivery_address)
        .bind(&order.courier_service)
        .bind(order.package_weight)
        .bind(&order.package_dimensions)
        .bind(order.price)
        .bind(&order.notes)
        .bind(order.pickup_location.map(|p| p.lat))
        .bind(order.pickup_location.map(|p| p.lng))
        .bind(order.delivery_location.map(|p| p.lat))
        .bind(order.delivery_location.map(|p| p.lng))
        .bind(order.courier_location.map(|p| p.lat))
        .bind(order.courier_location.map(|p| p.lng))
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(entry) = entry {
            sqlx::query(
                "INSERT INTO status_history (id, order_id, status, updated_by, reason, notes, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(entry.id)
            .bind(entry.order_id)
            .bind(entry.status.as_str())
            .bind(&entry.updated_by)
            .bind(&entry.reason)
            .bind(&entry.notes)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM orders").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn list_history(&self, order_id: Uuid) -> StoreResult<Vec<StatusHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT id, order_id, status, updated_by, reason, notes, created_at
             FROM status_history
             WHERE order_id = $1
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(history_from_row).collect()
    }

    async fn filter_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders
             WHERE ($1::TEXT IS NULL OR status = $1)
               AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
               AND ($3::TIMESTAMPTZ IS NULL OR created_at <= $3)
             ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.from_date)
        .bind(filter.to_date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn orders_for_customer(&self, customer_id: Uuid) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn count_orders(&self, status: Option<OrderStatus>) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_email(&self, email: &Email) -> StoreResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE email = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        insert_account_row(&self.pool, account).await
    }

    async fn count_accounts(&self, role: Role) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
