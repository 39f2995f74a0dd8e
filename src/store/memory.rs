use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{OrderStore, ReassignmentOutcome};
use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::domain::payment::{NewPayment, Payment};
use crate::domain::{CustomerId, ItemId, OrderId};
use crate::ports::{Catalog, Customers, ItemSnapshot};

// ============================================================================
// In-Memory Store & Fixtures
// ============================================================================
//
// Backs the demo binary and every test. A single mutex per collection makes
// the race-sensitive operations trivially atomic:
// - `insert_cart` checks cart uniqueness and inserts under one lock
// - `decrement_stock` is check-and-subtract under one lock
// - `save` compares the stored status and replaces under one lock
//
// No lock is ever held across an await point.
//
// ============================================================================

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Order store
// ----------------------------------------------------------------------------

#[derive(Default)]
struct StoreInner {
    next_order_id: OrderId,
    next_payment_id: i64,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<OrderId, Payment>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_cart(
        &self,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let mut inner = locked(&self.inner);

        let has_open_cart = inner
            .orders
            .values()
            .any(|o| o.customer_id == customer_id && o.status == OrderStatus::Cart);
        if has_open_cart {
            return Err(OrderError::CartAlreadyExists(customer_id));
        }

        inner.next_order_id += 1;
        let order = Order::new_cart(inner.next_order_id, customer_id, created_at);
        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn fetch(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        Ok(locked(&self.inner).orders.get(&order_id).cloned())
    }

    async fn save(&self, order: &Order, expected: OrderStatus) -> Result<(), OrderError> {
        let mut inner = locked(&self.inner);
        match inner.orders.get(&order.id) {
            None => return Err(OrderError::OrderNotFound(order.id)),
            // Compare-and-swap on the stored status: a stale snapshot loses.
            Some(stored) if stored.status != expected => {
                return Err(OrderError::ConcurrentUpdate(order.id));
            }
            Some(_) => {}
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_cart(&self, order_id: OrderId) -> Result<(), OrderError> {
        let mut inner = locked(&self.inner);
        match inner.orders.get(&order_id) {
            Some(order) if order.status == OrderStatus::Cart => {
                inner.orders.remove(&order_id);
                Ok(())
            }
            _ => Err(OrderError::CartNotFound(order_id)),
        }
    }

    async fn persist_confirmation(
        &self,
        order: &Order,
        payment: NewPayment,
    ) -> Result<Payment, OrderError> {
        let mut inner = locked(&self.inner);

        match inner.orders.get(&order.id) {
            None => return Err(OrderError::OrderNotFound(order.id)),
            Some(stored) if stored.status != OrderStatus::Pending => {
                return Err(OrderError::invalid_transition(
                    stored.status,
                    OrderStatus::Confirmed,
                ));
            }
            Some(_) => {}
        }

        inner.next_payment_id += 1;
        let payment = Payment {
            id: inner.next_payment_id,
            order_id: payment.order_id,
            amount_cents: payment.amount_cents,
            payment_type: payment.payment_type,
            recorded_at: payment.recorded_at,
        };

        inner.orders.insert(order.id, order.clone());
        inner.payments.insert(order.id, payment.clone());
        Ok(payment)
    }

    async fn payment_for(&self, order_id: OrderId) -> Result<Option<Payment>, OrderError> {
        Ok(locked(&self.inner).payments.get(&order_id).cloned())
    }

    async fn find_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Option<Order>, OrderError> {
        Ok(locked(&self.inner)
            .orders
            .values()
            .find(|o| o.customer_id == customer_id && o.status == OrderStatus::Cart)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = locked(&self.inner).orders.values().cloned().collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = locked(&self.inner)
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, OrderError> {
        let mut orders: Vec<Order> = locked(&self.inner)
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn delete_expired_carts(&self, cutoff: DateTime<Utc>) -> Result<u64, OrderError> {
        let mut inner = locked(&self.inner);
        let before = inner.orders.len();
        inner
            .orders
            .retain(|_, o| !(o.status == OrderStatus::Cart && o.created_at < cutoff));
        Ok((before - inner.orders.len()) as u64)
    }

    async fn reassign_customer(
        &self,
        customer_id: CustomerId,
        sentinel: CustomerId,
    ) -> Result<ReassignmentOutcome, OrderError> {
        let mut inner = locked(&self.inner);

        let before = inner.orders.len();
        inner
            .orders
            .retain(|_, o| !(o.customer_id == customer_id && o.status == OrderStatus::Cart));
        let cart_deleted = inner.orders.len() < before;

        let mut orders_reassigned = 0;
        for order in inner.orders.values_mut() {
            if order.customer_id == customer_id {
                order.customer_id = sentinel;
                orders_reassigned += 1;
            }
        }

        Ok(ReassignmentOutcome {
            cart_deleted,
            orders_reassigned,
        })
    }
}

// ----------------------------------------------------------------------------
// Catalog fixture
// ----------------------------------------------------------------------------

struct CatalogItem {
    snapshot: ItemSnapshot,
    amount_in_stock: i64,
}

#[derive(Default)]
pub struct MemoryCatalog {
    items: Mutex<HashMap<ItemId, CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_item(
        &self,
        item_id: ItemId,
        title: &str,
        price_cents: i64,
        minimum_age: u32,
        amount_in_stock: i64,
    ) {
        locked(&self.items).insert(
            item_id,
            CatalogItem {
                snapshot: ItemSnapshot {
                    title: title.to_string(),
                    price_cents,
                    minimum_age,
                },
                amount_in_stock,
            },
        );
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn item(&self, item_id: ItemId) -> Result<ItemSnapshot, OrderError> {
        locked(&self.items)
            .get(&item_id)
            .map(|i| i.snapshot.clone())
            .ok_or(OrderError::ItemNotFound(item_id))
    }

    async fn stock(&self, item_id: ItemId) -> Result<i64, OrderError> {
        locked(&self.items)
            .get(&item_id)
            .map(|i| i.amount_in_stock)
            .ok_or(OrderError::ItemNotFound(item_id))
    }

    async fn decrement_stock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError> {
        let mut items = locked(&self.items);
        let item = items
            .get_mut(&item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;

        // Check-and-subtract under the lock; stock can never go negative.
        if quantity > item.amount_in_stock {
            return Err(OrderError::InsufficientStock {
                item_id,
                requested: quantity,
                available: item.amount_in_stock,
            });
        }
        item.amount_in_stock -= quantity;
        Ok(())
    }

    async fn restock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError> {
        let mut items = locked(&self.items);
        let item = items
            .get_mut(&item_id)
            .ok_or(OrderError::ItemNotFound(item_id))?;
        item.amount_in_stock += quantity;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Customer directory fixture
// ----------------------------------------------------------------------------

pub struct MemoryCustomers {
    sentinel: CustomerId,
    birth_dates: Mutex<HashMap<CustomerId, NaiveDate>>,
}

impl MemoryCustomers {
    /// The sentinel customer is registered as a real record; its orders are
    /// readable like anyone else's, it just cannot shop.
    pub fn new(sentinel: CustomerId) -> Self {
        let directory = Self {
            sentinel,
            birth_dates: Mutex::new(HashMap::new()),
        };
        locked(&directory.birth_dates).insert(sentinel, NaiveDate::MIN);
        directory
    }

    pub fn seed_customer(&self, customer_id: CustomerId, date_of_birth: NaiveDate) {
        locked(&self.birth_dates).insert(customer_id, date_of_birth);
    }

    /// Convenience for tests: a customer whose age is `years` today.
    pub fn seed_customer_aged(&self, customer_id: CustomerId, years: u32) {
        let today = Utc::now().date_naive();
        // Land well inside the requested year of life.
        let date_of_birth = today - chrono::Duration::days(i64::from(years) * 366 + 30);
        self.seed_customer(customer_id, date_of_birth);
    }
}

#[async_trait]
impl Customers for MemoryCustomers {
    async fn exists(&self, customer_id: CustomerId) -> Result<bool, OrderError> {
        Ok(locked(&self.birth_dates).contains_key(&customer_id))
    }

    async fn age(&self, customer_id: CustomerId) -> Result<u32, OrderError> {
        let date_of_birth = locked(&self.birth_dates)
            .get(&customer_id)
            .copied()
            .ok_or(OrderError::CustomerNotFound(customer_id))?;

        Ok(Utc::now()
            .date_naive()
            .years_since(date_of_birth)
            .unwrap_or(0))
    }

    fn sentinel_id(&self) -> CustomerId {
        self.sentinel
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
