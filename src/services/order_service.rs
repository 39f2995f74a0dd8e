use std::sync::Arc;

use chrono::Utc;

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::domain::payment::{NewPayment, Payment, PaymentType};
use crate::domain::{CustomerId, OrderId};
use crate::inventory::InventoryLedger;
use crate::metrics::Metrics;
use crate::ports::{Catalog, Customers};
use crate::store::{OrderStore, ReassignmentOutcome};

// ============================================================================
// Order Service - The Status State Machine and Its Side Effects
// ============================================================================
//
// Triggers and their edges:
//
//   checkout        Cart      -> Pending      (no side effects)
//   confirm(type)   Pending   -> Confirmed    (stock decrement + payment)
//   cancel          Confirmed -> Cancelled    (no restock)
//   change_status   Confirmed -> Preparation, Preparation -> Shipped,
//                   Shipped -> Delivered, Confirmed -> Cancelled
//
// `change_status` never moves an order out of Cart or Pending: checkout and
// confirm are the only triggers for those edges (confirm needs a payment
// method). Cancellation keeps the stock deducted; see DESIGN.md.
//
// Confirmation ordering: prices are resolved first, then stock is taken
// (all-or-nothing across lines), then status + payment persist as one store
// unit. If persistence fails after the decrement, the stock is restocked
// before the error propagates, so a Confirmed order with no payment and a
// payment with stale stock are both unobservable.
//
// ============================================================================

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    customers: Arc<dyn Customers>,
    ledger: InventoryLedger,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        customers: Arc<dyn Customers>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let ledger = InventoryLedger::new(catalog.clone());
        Self {
            store,
            catalog,
            customers,
            ledger,
            metrics,
        }
    }

    /// Cart -> Pending. The cart stops being mutable and can no longer be
    /// deleted, but stock is still untouched.
    pub async fn checkout(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let mut order = self.fetch(order_id).await?;
        let from = order.status;
        order.transition(OrderStatus::Pending, Utc::now())?;
        self.store.save(&order, from).await?;
        tracing::info!(order_id, "Order checked out");
        Ok(order)
    }

    /// Pending -> Confirmed: take stock for every line item (all-or-nothing)
    /// and record exactly one payment for the order's total at current
    /// prices.
    pub async fn confirm(
        &self,
        order_id: OrderId,
        payment_type: PaymentType,
    ) -> Result<(Order, Payment), OrderError> {
        let mut order = self.fetch(order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::invalid_transition(
                order.status,
                OrderStatus::Confirmed,
            ));
        }

        // Resolve prices before touching stock so a missing item aborts
        // without any compensation needed.
        let mut amount_cents = 0;
        for line in &order.lines {
            let item = self.catalog.item(line.item_id).await?;
            amount_cents += item.price_cents * line.quantity;
        }

        if let Err(err) = self.ledger.decrement_order(&order.lines).await {
            if matches!(err, OrderError::InsufficientStock { .. }) {
                self.metrics
                    .stock_rejections
                    .with_label_values(&["confirm"])
                    .inc();
            }
            return Err(err);
        }

        let now = Utc::now();
        order.transition(OrderStatus::Confirmed, now)?;
        let payment = NewPayment {
            order_id,
            amount_cents,
            payment_type,
            recorded_at: now,
        };

        match self.store.persist_confirmation(&order, payment).await {
            Ok(payment) => {
                self.metrics.orders_confirmed.inc();
                tracing::info!(
                    order_id,
                    amount_cents,
                    payment_type = %payment.payment_type,
                    "Order confirmed"
                );
                Ok((order, payment))
            }
            Err(err) => {
                // Stock was already taken; give it back before failing.
                if let Err(restock) = self.ledger.restock_order(&order.lines).await {
                    tracing::error!(
                        order_id,
                        error = %restock,
                        "Failed to restock after aborted confirmation"
                    );
                }
                Err(err)
            }
        }
    }

    /// Confirmed -> Cancelled. Deliberately does not restock: cancelled
    /// orders keep their stock deducted.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let mut order = self.fetch(order_id).await?;
        let from = order.status;
        order.transition(OrderStatus::Cancelled, Utc::now())?;
        self.store.save(&order, from).await?;
        self.metrics.orders_cancelled.inc();
        tracing::info!(order_id, "Order cancelled");
        Ok(order)
    }

    /// Move an order to an explicit target status. Only the fulfillment
    /// edges (and cancellation) are reachable here; any other target fails
    /// with an error describing the only legal next status.
    pub async fn change_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, OrderError> {
        let mut order = self.fetch(order_id).await?;

        match target {
            OrderStatus::Pending if order.status == OrderStatus::Cart => {
                return Err(OrderError::CheckoutRequired(order_id));
            }
            OrderStatus::Confirmed if order.status == OrderStatus::Pending => {
                return Err(OrderError::PaymentRequired(order_id));
            }
            OrderStatus::Cart | OrderStatus::Pending | OrderStatus::Confirmed => {
                return Err(OrderError::invalid_transition(order.status, target));
            }
            _ => {}
        }

        let from = order.status;
        order.transition(target, Utc::now())?;
        self.store.save(&order, from).await?;
        if target == OrderStatus::Cancelled {
            self.metrics.orders_cancelled.inc();
        }
        tracing::info!(order_id, status = %target, "Order status changed");
        Ok(order)
    }

    /// Account-deletion hook: the open cart (if any) is deleted outright;
    /// every order past Cart is re-pointed to the sentinel customer, never
    /// deleted.
    pub async fn reassign_orders_to_sentinel(
        &self,
        customer_id: CustomerId,
    ) -> Result<ReassignmentOutcome, OrderError> {
        let sentinel = self.customers.sentinel_id();
        let outcome = self.store.reassign_customer(customer_id, sentinel).await?;
        tracing::info!(
            customer_id,
            sentinel,
            cart_deleted = outcome.cart_deleted,
            orders_reassigned = outcome.orders_reassigned,
            "Customer orders reassigned to sentinel"
        );
        Ok(outcome)
    }

    async fn fetch(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .fetch(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CartService;
    use crate::store::{MemoryCatalog, MemoryCustomers, MemoryStore};

    const SENTINEL: CustomerId = 0;

    struct Fixture {
        carts: CartService,
        orders: OrderService,
        catalog: Arc<MemoryCatalog>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let customers = Arc::new(MemoryCustomers::new(SENTINEL));
        let metrics = Arc::new(Metrics::new().unwrap());

        customers.seed_customer_aged(1, 35);

        catalog.seed_item(5, "The Rust Programming Language", 3000, 0, 10);
        catalog.seed_item(6, "Horror Anthology", 2500, 18, 3);

        let carts = CartService::new(
            store.clone(),
            catalog.clone(),
            customers.clone(),
            metrics.clone(),
        );
        let orders = OrderService::new(
            store.clone(),
            catalog.clone(),
            customers,
            metrics,
        );
        Fixture {
            carts,
            orders,
            catalog,
            store,
        }
    }

    impl Fixture {
        /// Drive a fresh order for customer 1 (item 5, quantity 1) into the
        /// given status through the real triggers.
        async fn order_in(&self, status: OrderStatus) -> OrderId {
            let cart = self.carts.create_cart(1, 5, 1).await.unwrap();
            let id = cart.id;
            if status == OrderStatus::Cart {
                return id;
            }
            self.orders.checkout(id).await.unwrap();
            if status == OrderStatus::Pending {
                return id;
            }
            self.orders.confirm(id, PaymentType::Card).await.unwrap();
            match status {
                OrderStatus::Confirmed => id,
                OrderStatus::Cancelled => {
                    self.orders.cancel(id).await.unwrap();
                    id
                }
                _ => {
                    for next in [
                        OrderStatus::Preparation,
                        OrderStatus::Shipped,
                        OrderStatus::Delivered,
                    ] {
                        self.orders.change_status(id, next).await.unwrap();
                        if next == status {
                            break;
                        }
                    }
                    id
                }
            }
        }
    }

    #[tokio::test]
    async fn test_full_purchase_scenario() {
        let f = fixture();

        // Cart for customer 1 with item 5 (stock 10), quantity 3
        let cart = f.carts.create_cart(1, 5, 3).await.unwrap();
        assert_eq!(f.catalog.stock(5).await.unwrap(), 10);

        f.orders.checkout(cart.id).await.unwrap();
        let (order, payment) = f.orders.confirm(cart.id, PaymentType::Cash).await.unwrap();

        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.confirmed_at.is_some());
        assert_eq!(f.catalog.stock(5).await.unwrap(), 7);
        assert_eq!(payment.amount_cents, 3 * 3000);
        assert_eq!(payment.payment_type, PaymentType::Cash);
        assert_eq!(
            f.store.payment_for(cart.id).await.unwrap().unwrap().id,
            payment.id
        );
    }

    #[tokio::test]
    async fn test_double_confirm_creates_no_second_payment() {
        let f = fixture();
        let id = f.order_in(OrderStatus::Pending).await;

        let (_, first) = f.orders.confirm(id, PaymentType::Cash).await.unwrap();
        let err = f.orders.confirm(id, PaymentType::Cash).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        let payment = f.store.payment_for(id).await.unwrap().unwrap();
        assert_eq!(payment.id, first.id);

        // Stock was taken exactly once
        assert_eq!(f.catalog.stock(5).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_confirmation_is_atomic_across_lines() {
        let f = fixture();
        let cart = f.carts.create_cart(1, 5, 2).await.unwrap();
        f.carts.add_item(cart.id, 6, 3).await.unwrap();
        f.orders.checkout(cart.id).await.unwrap();

        // Another buyer drains item 6 before confirmation
        f.catalog.decrement_stock(6, 2).await.unwrap();

        let err = f.orders.confirm(cart.id, PaymentType::Card).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InsufficientStock { item_id: 6, .. }
        ));

        // Neither line was kept, no payment exists, order is still Pending
        assert_eq!(f.catalog.stock(5).await.unwrap(), 10);
        assert_eq!(f.catalog.stock(6).await.unwrap(), 1);
        assert!(f.store.payment_for(cart.id).await.unwrap().is_none());
        let order = f.store.fetch(cart.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.confirmed_at.is_none());
    }

    #[tokio::test]
    async fn test_stale_cart_snapshot_cannot_rewind_confirmed_order() {
        let f = fixture();
        let cart = f.carts.create_cart(1, 5, 3).await.unwrap();

        // Snapshot taken while the order was still a cart
        let stale = f.store.fetch(cart.id).await.unwrap().unwrap();
        assert_eq!(stale.status, OrderStatus::Cart);

        f.orders.checkout(cart.id).await.unwrap();
        f.orders.confirm(cart.id, PaymentType::Card).await.unwrap();

        // Writing the stale snapshot back must lose, not revert the status
        let err = f.store.save(&stale, OrderStatus::Cart).await.unwrap_err();
        assert!(matches!(err, OrderError::ConcurrentUpdate(_)));

        let stored = f.store.fetch(cart.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert!(f.store.payment_for(cart.id).await.unwrap().is_some());
        assert_eq!(f.catalog.stock(5).await.unwrap(), 7);

        // The paid order is invisible to the sweeper
        let cutoff = Utc::now() + chrono::Duration::days(1);
        assert_eq!(f.store.delete_expired_carts(cutoff).await.unwrap(), 0);
        assert!(f.store.fetch(cart.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_does_not_restock() {
        let f = fixture();
        let id = f.order_in(OrderStatus::Confirmed).await;
        assert_eq!(f.catalog.stock(5).await.unwrap(), 9);

        let order = f.orders.cancel(id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());

        // Cancelled orders keep their stock deducted
        assert_eq!(f.catalog.stock(5).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_cancel_requires_confirmed() {
        let f = fixture();
        let id = f.order_in(OrderStatus::Pending).await;
        let err = f.orders.cancel(id).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        let id = f.order_in(OrderStatus::Delivered).await;
        let err = f.orders.cancel(id).await.unwrap_err();
        assert!(matches!(err, OrderError::TerminalStatus { .. }));
    }

    #[tokio::test]
    async fn test_checkout_requires_cart() {
        let f = fixture();
        let id = f.order_in(OrderStatus::Pending).await;
        let err = f.orders.checkout(id).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        let err = f.orders.checkout(99999).await.unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(99999)));
    }

    #[tokio::test]
    async fn test_change_status_grid() {
        let f = fixture();

        // Plenty of stock: the grid confirms dozens of one-copy orders
        f.catalog.restock(5, 1000).await.unwrap();

        // The only pairs reachable through change_status
        let legal = [
            (OrderStatus::Confirmed, OrderStatus::Preparation),
            (OrderStatus::Confirmed, OrderStatus::Cancelled),
            (OrderStatus::Preparation, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ];

        for from in OrderStatus::ALL {
            for target in OrderStatus::ALL {
                let id = f.order_in(from).await;
                let result = f.orders.change_status(id, target).await;

                if legal.contains(&(from, target)) {
                    let order = result.unwrap_or_else(|e| {
                        panic!("{from} -> {target} should succeed, got {e}")
                    });
                    assert_eq!(order.status, target);
                } else {
                    assert!(result.is_err(), "{from} -> {target} should fail");
                    let stored = f.store.fetch(id).await.unwrap().unwrap();
                    assert_eq!(stored.status, from, "failed change must not mutate");
                }

                // Reset so customer 1 can open the next cart
                f.orders.reassign_orders_to_sentinel(1).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_change_status_points_at_the_dedicated_triggers() {
        let f = fixture();

        let id = f.order_in(OrderStatus::Cart).await;
        let err = f
            .orders
            .change_status(id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::CheckoutRequired(_)));

        let id = f.order_in(OrderStatus::Pending).await;
        let err = f
            .orders
            .change_status(id, OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PaymentRequired(_)));
    }

    #[tokio::test]
    async fn test_skipping_a_fulfillment_step_names_the_legal_next() {
        let f = fixture();
        let id = f.order_in(OrderStatus::Preparation).await;

        let err = f
            .orders
            .change_status(id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        match err {
            OrderError::InvalidTransition { from, legal, .. } => {
                assert_eq!(from, OrderStatus::Preparation);
                assert_eq!(legal, OrderStatus::Shipped);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reassignment_preserves_placed_orders() {
        let f = fixture();
        let placed = f.order_in(OrderStatus::Confirmed).await;
        let cart = f.carts.create_cart(1, 5, 1).await.unwrap();

        let outcome = f.orders.reassign_orders_to_sentinel(1).await.unwrap();
        assert!(outcome.cart_deleted);
        assert_eq!(outcome.orders_reassigned, 1);

        assert!(f.store.fetch(cart.id).await.unwrap().is_none());
        let placed = f.store.fetch(placed).await.unwrap().unwrap();
        assert_eq!(placed.customer_id, SENTINEL);
        assert_eq!(placed.status, OrderStatus::Confirmed);
    }
}
