use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::domain::payment::Payment;
use crate::domain::{CustomerId, ItemId, OrderId};
use crate::ports::Catalog;
use crate::store::OrderStore;

// ============================================================================
// Order Query Service - Read-Side Projections
// ============================================================================
//
// Thin read mapping over the store: summaries, a detailed order view, and
// status/customer listings. Totals are computed at read time from current
// catalog prices; only a Payment freezes an amount.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineView {
    pub item_id: ItemId,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
    pub total_cents: i64,
    pub payment: Option<Payment>,
}

pub struct OrderQueries {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
}

impl OrderQueries {
    pub fn new(store: Arc<dyn OrderStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails, OrderError> {
        let order = self
            .store
            .fetch(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        let payment = self.store.payment_for(order_id).await?;

        let mut lines = Vec::with_capacity(order.lines.len());
        let mut total_cents = 0;
        for line in &order.lines {
            let item = self.catalog.item(line.item_id).await?;
            let line_total_cents = item.price_cents * line.quantity;
            total_cents += line_total_cents;
            lines.push(OrderLineView {
                item_id: line.item_id,
                title: item.title,
                quantity: line.quantity,
                unit_price_cents: item.price_cents,
                line_total_cents,
            });
        }

        Ok(OrderDetails {
            order_id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            created_at: order.created_at,
            last_updated: order.last_updated(),
            lines,
            total_cents,
            payment,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<OrderSummary>, OrderError> {
        let orders = self.store.list_all().await?;
        self.summarize(orders).await
    }

    pub async fn list_by_status(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<OrderSummary>, OrderError> {
        let orders = self.store.list_by_status(status).await?;
        self.summarize(orders).await
    }

    /// A customer's order history: placed orders only, open carts and
    /// not-yet-confirmed checkouts are excluded.
    pub async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<OrderSummary>, OrderError> {
        let orders = self
            .store
            .list_by_customer(customer_id)
            .await?
            .into_iter()
            .filter(|o| !matches!(o.status, OrderStatus::Cart | OrderStatus::Pending))
            .collect();
        self.summarize(orders).await
    }

    async fn summarize(&self, orders: Vec<Order>) -> Result<Vec<OrderSummary>, OrderError> {
        let mut summaries = Vec::with_capacity(orders.len());
        for order in orders {
            let mut total_cents = 0;
            for line in &order.lines {
                let item = self.catalog.item(line.item_id).await?;
                total_cents += item.price_cents * line.quantity;
            }
            summaries.push(OrderSummary {
                order_id: order.id,
                customer_id: order.customer_id,
                status: order.status,
                total_cents,
                last_updated: order.last_updated(),
            });
        }
        Ok(summaries)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentType;
    use crate::metrics::Metrics;
    use crate::services::{CartService, OrderService};
    use crate::store::{MemoryCatalog, MemoryCustomers, MemoryStore};

    struct Fixture {
        carts: CartService,
        orders: OrderService,
        queries: OrderQueries,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let customers = Arc::new(MemoryCustomers::new(0));
        let metrics = Arc::new(Metrics::new().unwrap());

        customers.seed_customer_aged(1, 35);
        customers.seed_customer_aged(2, 40);
        catalog.seed_item(5, "The Rust Programming Language", 3000, 0, 100);

        Fixture {
            carts: CartService::new(
                store.clone(),
                catalog.clone(),
                customers.clone(),
                metrics.clone(),
            ),
            orders: OrderService::new(store.clone(), catalog.clone(), customers, metrics),
            queries: OrderQueries::new(store, catalog),
        }
    }

    #[tokio::test]
    async fn test_order_details_resolve_lines_and_payment() {
        let f = fixture();
        let cart = f.carts.create_cart(1, 5, 2).await.unwrap();
        f.orders.checkout(cart.id).await.unwrap();
        f.orders.confirm(cart.id, PaymentType::Card).await.unwrap();

        let details = f.queries.order_details(cart.id).await.unwrap();
        assert_eq!(details.status, OrderStatus::Confirmed);
        assert_eq!(details.total_cents, 6000);
        assert_eq!(details.lines.len(), 1);
        assert_eq!(details.lines[0].title, "The Rust Programming Language");
        let payment = details.payment.unwrap();
        assert_eq!(payment.amount_cents, 6000);
        assert_eq!(details.last_updated, payment.recorded_at);

        let err = f.queries.order_details(99999).await.unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(99999)));
    }

    #[tokio::test]
    async fn test_customer_history_excludes_cart_and_pending() {
        let f = fixture();

        // Customer 1: one confirmed order, then a pending one, then a cart
        let first = f.carts.create_cart(1, 5, 1).await.unwrap();
        f.orders.checkout(first.id).await.unwrap();
        f.orders.confirm(first.id, PaymentType::Cash).await.unwrap();

        let second = f.carts.create_cart(1, 5, 1).await.unwrap();
        f.orders.checkout(second.id).await.unwrap();

        let third = f.carts.create_cart(1, 5, 1).await.unwrap();

        let history = f.queries.list_by_customer(1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].order_id, first.id);

        // The raw listings still see everything
        assert_eq!(f.queries.list_all().await.unwrap().len(), 3);
        let carts = f.queries.list_by_status(OrderStatus::Cart).await.unwrap();
        assert_eq!(carts.len(), 1);
        assert_eq!(carts[0].order_id, third.id);
    }

    #[tokio::test]
    async fn test_totals_follow_current_prices() {
        let f = fixture();
        let cart = f.carts.create_cart(2, 5, 3).await.unwrap();

        let details = f.queries.order_details(cart.id).await.unwrap();
        assert_eq!(details.total_cents, 9000);
        assert!(details.payment.is_none());
    }
}
