use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::domain::payment::{NewPayment, Payment};
use crate::domain::{CustomerId, OrderId};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCatalog, MemoryCustomers, MemoryStore};
pub use postgres::{PgCatalog, PgStore};

// ============================================================================
// Order Store - Durable Orders, Line Items, and Payments
// ============================================================================
//
// The store is the only component that persists order state. Two operations
// carry consistency obligations beyond plain CRUD:
//
// 1. `insert_cart` enforces at-most-one open cart per customer *atomically*
//    (unique constraint or single critical section), never by a pre-check
//    the caller could race past.
// 2. `persist_confirmation` writes the status change and the payment as one
//    unit: a Confirmed order without a payment is never observable.
// 3. `save` is optimistic: it only applies when the stored status still
//    matches what the caller read, so a stale fetch-modify-save snapshot
//    cannot rewind an order another writer has already moved.
//
// ============================================================================

/// What `reassign_customer` actually did, for logging and auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassignmentOutcome {
    pub cart_deleted: bool,
    pub orders_reassigned: u64,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create an empty Cart-status order for the customer. Fails with
    /// `CartAlreadyExists` if the customer already has an open cart; the
    /// check and the insert are one atomic step.
    async fn insert_cart(
        &self,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
    ) -> Result<Order, OrderError>;

    async fn fetch(&self, order_id: OrderId) -> Result<Option<Order>, OrderError>;

    /// Replace the stored order (status, timestamps, line items) with the
    /// given aggregate, but only if the stored status is still `expected`
    /// (the status the caller fetched the order in). Fails with
    /// `OrderNotFound` if the id is unknown and `ConcurrentUpdate` if
    /// another writer moved the order first; the stored row is untouched
    /// either way.
    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<(), OrderError>;

    /// Physically delete a Cart-status order. Fails with `CartNotFound` if
    /// the order does not exist or is past checkout (non-cart orders are
    /// never deleted).
    async fn delete_cart(&self, order_id: OrderId) -> Result<(), OrderError>;

    /// Persist the Pending -> Confirmed outcome as one unit: the order's new
    /// status/timestamps and exactly one payment. Fails if the stored order
    /// is no longer Pending, so a racing double-confirm cannot create a
    /// second payment.
    async fn persist_confirmation(
        &self,
        order: &Order,
        payment: NewPayment,
    ) -> Result<Payment, OrderError>;

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<Payment>, OrderError>;

    async fn find_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Order>, OrderError>;

    async fn list_all(&self) -> Result<Vec<Order>, OrderError>;

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderError>;

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderError>;

    /// Delete every Cart-status order created strictly before `cutoff`.
    /// Returns the number of carts deleted. No stock or payment side
    /// effects: a cart never decremented stock.
    async fn delete_expired_carts(&self, cutoff: DateTime<Utc>) -> Result<u64, OrderError>;

    /// Account-deletion hook: drop the customer's open cart (if any) and
    /// re-point all their non-cart orders to the sentinel customer.
    async fn reassign_customer(
        &self,
        customer_id: CustomerId,
        sentinel: CustomerId,
    ) -> Result<ReassignmentOutcome, OrderError>;
}
