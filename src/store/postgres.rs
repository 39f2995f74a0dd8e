use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{OrderStore, ReassignmentOutcome};
use crate::domain::order::{LineItem, Order, OrderError, OrderStatus};
use crate::domain::payment::{NewPayment, Payment, PaymentType};
use crate::domain::{CustomerId, ItemId, OrderId};
use crate::ports::{Catalog, ItemSnapshot};

// ============================================================================
// Postgres Store - Durable Relational Rows
// ============================================================================
//
// Orders, line items, and payments are plain relational rows; stock is a
// counter column on `items`. The consistency obligations are carried by
// the database itself:
//
// 1. One open cart per customer: a partial unique index on (customer_id)
//    filtered to status = 'Cart'. Concurrent inserts race at the index, not
//    at an application-level pre-check.
// 2. Overselling: stock decrement is a conditional UPDATE guarded by
//    `amount_in_stock >= quantity`; losers of the race see zero rows
//    affected. The CHECK constraint keeps the column non-negative even
//    against out-of-band writers.
// 3. Lost updates: `save` and `persist_confirmation` are conditional on the
//    stored status, so stale snapshots lose the race instead of rewinding
//    the row.
//
// ============================================================================

const OPEN_CART_INDEX: &str = "one_open_cart_per_customer";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        confirmed_at TIMESTAMPTZ,
        preparation_started_at TIMESTAMPTZ,
        shipped_at TIMESTAMPTZ,
        delivered_at TIMESTAMPTZ,
        cancelled_at TIMESTAMPTZ
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS one_open_cart_per_customer
        ON orders (customer_id) WHERE status = 'Cart'",
    "CREATE TABLE IF NOT EXISTS order_lines (
        order_id BIGINT NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        item_id BIGINT NOT NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        PRIMARY KEY (order_id, item_id)
    )",
    "CREATE TABLE IF NOT EXISTS payments (
        id BIGSERIAL PRIMARY KEY,
        order_id BIGINT NOT NULL UNIQUE REFERENCES orders (id),
        amount_cents BIGINT NOT NULL,
        payment_type TEXT NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS items (
        id BIGINT PRIMARY KEY,
        title TEXT NOT NULL,
        price_cents BIGINT NOT NULL,
        minimum_age INT NOT NULL DEFAULT 0,
        amount_in_stock BIGINT NOT NULL CHECK (amount_in_stock >= 0)
    )",
];

const ORDER_COLUMNS: &str = "id, customer_id, status, created_at, confirmed_at, \
     preparation_started_at, shipped_at, delivered_at, cancelled_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    customer_id: i64,
    status: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    preparation_started_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<LineItem>) -> Result<Order, OrderError> {
        let status = self
            .status
            .parse::<OrderStatus>()
            .map_err(|e| OrderError::Storage(anyhow::anyhow!(e)))?;
        Ok(Order {
            id: self.id,
            customer_id: self.customer_id,
            status,
            lines,
            created_at: self.created_at,
            confirmed_at: self.confirmed_at,
            preparation_started_at: self.preparation_started_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LineRow {
    item_id: i64,
    quantity: i64,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    amount_cents: i64,
    payment_type: String,
    recorded_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, OrderError> {
        let payment_type = self
            .payment_type
            .parse::<PaymentType>()
            .map_err(|e| OrderError::Storage(anyhow::anyhow!(e)))?;
        Ok(Payment {
            id: self.id,
            order_id: self.order_id,
            amount_cents: self.amount_cents,
            payment_type,
            recorded_at: self.recorded_at,
        })
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, OrderError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), OrderError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Order schema ready");
        Ok(())
    }

    async fn lines_for(&self, order_id: OrderId) -> Result<Vec<LineItem>, OrderError> {
        let rows: Vec<LineRow> =
            sqlx::query_as("SELECT item_id, quantity FROM order_lines WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|r| LineItem {
                item_id: r.item_id,
                quantity: r.quantity,
            })
            .collect())
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, OrderError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.lines_for(row.id).await?;
            orders.push(row.into_order(lines)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_cart(
        &self,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let sql = format!(
            "INSERT INTO orders (customer_id, status, created_at) \
             VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
        );
        let row: OrderRow = sqlx::query_as(&sql)
            .bind(customer_id)
            .bind(OrderStatus::Cart.as_str())
            .bind(created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.constraint() == Some(OPEN_CART_INDEX) => {
                    OrderError::CartAlreadyExists(customer_id)
                }
                _ => OrderError::from(e),
            })?;
        row.into_order(Vec::new())
    }

    async fn fetch(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let lines = self.lines_for(row.id).await?;
                Ok(Some(row.into_order(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<(), OrderError> {
        let mut tx = self.pool.begin().await?;

        // Optimistic update: a stale snapshot sees zero rows affected and
        // never rewinds a row another writer already moved.
        let updated = sqlx::query(
            "UPDATE orders SET customer_id = $2, status = $3, created_at = $4, \
             confirmed_at = $5, preparation_started_at = $6, shipped_at = $7, \
             delivered_at = $8, cancelled_at = $9 \
             WHERE id = $1 AND status = $10",
        )
        .bind(order.id)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.confirmed_at)
        .bind(order.preparation_started_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.cancelled_at)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                None => OrderError::OrderNotFound(order.id),
                Some(_) => OrderError::ConcurrentUpdate(order.id),
            });
        }

        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;
        for line in &order.lines {
            sqlx::query("INSERT INTO order_lines (order_id, item_id, quantity) VALUES ($1, $2, $3)")
                .bind(order.id)
                .bind(line.item_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, order_id: OrderId) -> Result<(), OrderError> {
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1 AND status = 'Cart'")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(OrderError::CartNotFound(order_id));
        }
        Ok(())
    }

    async fn persist_confirmation(
        &self,
        order: &Order,
        payment: NewPayment,
    ) -> Result<Payment, OrderError> {
        let mut tx = self.pool.begin().await?;

        // Guarded update: a racing double-confirm loses here and no second
        // payment row is ever written.
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, confirmed_at = $3 \
             WHERE id = $1 AND status = 'Pending'",
        )
        .bind(order.id)
        .bind(OrderStatus::Confirmed.as_str())
        .bind(order.confirmed_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match status {
                None => OrderError::OrderNotFound(order.id),
                Some(s) => {
                    let from = s
                        .parse::<OrderStatus>()
                        .map_err(|e| OrderError::Storage(anyhow::anyhow!(e)))?;
                    OrderError::invalid_transition(from, OrderStatus::Confirmed)
                }
            });
        }

        let row: PaymentRow = sqlx::query_as(
            "INSERT INTO payments (order_id, amount_cents, payment_type, recorded_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, order_id, amount_cents, payment_type, recorded_at",
        )
        .bind(payment.order_id)
        .bind(payment.amount_cents)
        .bind(payment.payment_type.as_str())
        .bind(payment.recorded_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_payment()
    }

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<Payment>, OrderError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            "SELECT id, order_id, amount_cents, payment_type, recorded_at \
             FROM payments WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRow::into_payment).transpose()
    }

    async fn find_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Order>, OrderError> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 AND status = 'Cart'");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let lines = self.lines_for(row.id).await?;
                Ok(Some(row.into_order(lines)?))
            }
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY id");
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY id");
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY id");
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    async fn delete_expired_carts(&self, cutoff: DateTime<Utc>) -> Result<u64, OrderError> {
        let deleted = sqlx::query("DELETE FROM orders WHERE status = 'Cart' AND created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected())
    }

    async fn reassign_customer(
        &self,
        customer_id: CustomerId,
        sentinel: CustomerId,
    ) -> Result<ReassignmentOutcome, OrderError> {
        let mut tx = self.pool.begin().await?;

        let carts =
            sqlx::query("DELETE FROM orders WHERE customer_id = $1 AND status = 'Cart'")
                .bind(customer_id)
                .execute(&mut *tx)
                .await?;
        let reassigned = sqlx::query("UPDATE orders SET customer_id = $2 WHERE customer_id = $1")
            .bind(customer_id)
            .bind(sentinel)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ReassignmentOutcome {
            cart_deleted: carts.rows_affected() > 0,
            orders_reassigned: reassigned.rows_affected(),
        })
    }
}

// ----------------------------------------------------------------------------
// Catalog over the same pool
// ----------------------------------------------------------------------------

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn item(&self, item_id: ItemId) -> Result<ItemSnapshot, OrderError> {
        let row: Option<(String, i64, i32)> =
            sqlx::query_as("SELECT title, price_cents, minimum_age FROM items WHERE id = $1")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((title, price_cents, minimum_age)) => Ok(ItemSnapshot {
                title,
                price_cents,
                minimum_age: minimum_age.max(0) as u32,
            }),
            None => Err(OrderError::ItemNotFound(item_id)),
        }
    }

    async fn stock(&self, item_id: ItemId) -> Result<i64, OrderError> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT amount_in_stock FROM items WHERE id = $1")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;
        stock.ok_or(OrderError::ItemNotFound(item_id))
    }

    async fn decrement_stock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError> {
        // Conditional update: concurrent buyers serialize on the row and the
        // guard keeps stock non-negative.
        let updated = sqlx::query(
            "UPDATE items SET amount_in_stock = amount_in_stock - $2 \
             WHERE id = $1 AND amount_in_stock >= $2",
        )
        .bind(item_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let available = self.stock(item_id).await?;
            return Err(OrderError::InsufficientStock {
                item_id,
                requested: quantity,
                available,
            });
        }
        Ok(())
    }

    async fn restock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError> {
        let updated =
            sqlx::query("UPDATE items SET amount_in_stock = amount_in_stock + $2 WHERE id = $1")
                .bind(item_id)
                .bind(quantity)
                .execute(&self.pool)
                .await?;
        if updated.rows_affected() == 0 {
            return Err(OrderError::ItemNotFound(item_id));
        }
        Ok(())
    }
}
