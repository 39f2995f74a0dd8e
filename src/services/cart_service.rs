use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderError, OrderStatus};
use crate::domain::{CustomerId, ItemId, OrderId};
use crate::inventory::InventoryLedger;
use crate::metrics::Metrics;
use crate::ports::{Catalog, Customers};
use crate::store::OrderStore;

// ============================================================================
// Cart Service - The Single Open Cart per Customer
// ============================================================================
//
// Manages the pre-checkout order and its line items. Every quantity change
// is guarded by a live stock check through the Inventory Ledger, and every
// item addition by the purchaser's age against the item's age category
// (computed from the date of birth at call time, never cached).
//
// A cart never decrements stock; stock is only taken at confirmation.
//
// ============================================================================

/// A cart with its line items resolved against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<CartLineView>,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineView {
    pub item_id: ItemId,
    pub title: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

pub struct CartService {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    customers: Arc<dyn Customers>,
    ledger: InventoryLedger,
    metrics: Arc<Metrics>,
}

impl CartService {
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

    /// Open a cart for the customer with one initial line item. The item is
    /// added through the same path as `add_item`, so all its checks apply;
    /// if that add fails the freshly created cart is rolled back.
    pub async fn create_cart(
        &self,
        customer_id: CustomerId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<Order, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        if !self.customers.exists(customer_id).await? {
            return Err(OrderError::CustomerNotFound(customer_id));
        }
        if self.customers.is_sentinel(customer_id) {
            return Err(OrderError::DeletedCustomer(customer_id));
        }
        // Item existence is a NotFound outcome, checked before the cart row
        // is created.
        self.catalog.item(item_id).await?;

        let cart = self
            .store
            .insert_cart(customer_id, Utc::now())
            .await?;

        match self.add_item(cart.id, item_id, quantity).await {
            Ok(cart) => {
                self.metrics.carts_created.inc();
                tracing::info!(
                    order_id = cart.id,
                    customer_id,
                    item_id,
                    quantity,
                    "Cart created"
                );
                Ok(cart)
            }
            Err(err) => {
                // The empty cart must not survive a failed initial add.
                if let Err(cleanup) = self.store.delete_cart(cart.id).await {
                    tracing::error!(
                        order_id = cart.id,
                        error = %cleanup,
                        "Failed to roll back cart after rejected initial item"
                    );
                }
                Err(err)
            }
        }
    }

    /// Add `quantity` units of an item to a cart. If the item is already a
    /// line, quantities are summed and the *combined* quantity is
    /// re-validated against current stock; failure leaves the existing line
    /// unchanged.
    pub async fn add_item(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<Order, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        let mut cart = self.fetch_cart(order_id).await?;
        let item = self.catalog.item(item_id).await?;

        let age = self.customers.age(cart.customer_id).await?;
        if age < item.minimum_age {
            return Err(OrderError::UnderAge {
                customer_id: cart.customer_id,
                required: item.minimum_age,
                actual: age,
            });
        }

        let combined = cart
            .quantity_of(item_id)
            .checked_add(quantity)
            .ok_or(OrderError::InvalidQuantity(quantity))?;
        self.checked_stock(item_id, combined, "add_item").await?;

        cart.set_line(item_id, combined);
        self.store.save(&cart, OrderStatus::Cart).await?;
        tracing::debug!(order_id, item_id, quantity = combined, "Line item set");
        Ok(cart)
    }

    pub async fn remove_item(
        &self,
        order_id: OrderId,
        item_id: ItemId,
    ) -> Result<Order, OrderError> {
        let mut cart = self.fetch_cart(order_id).await?;
        self.catalog.item(item_id).await?;

        if !cart.remove_line(item_id) {
            return Err(OrderError::LineItemNotFound { order_id, item_id });
        }
        self.store.save(&cart, OrderStatus::Cart).await?;
        tracing::debug!(order_id, item_id, "Line item removed");
        Ok(cart)
    }

    /// Set the absolute quantity of an existing line (not a delta).
    pub async fn update_quantity(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<Order, OrderError> {
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity(quantity));
        }
        let mut cart = self.fetch_cart(order_id).await?;
        self.catalog.item(item_id).await?;

        if cart.line(item_id).is_none() {
            return Err(OrderError::LineItemNotFound { order_id, item_id });
        }
        self.checked_stock(item_id, quantity, "update_quantity").await?;

        cart.set_line(item_id, quantity);
        self.store.save(&cart, OrderStatus::Cart).await?;
        tracing::debug!(order_id, item_id, quantity, "Line quantity updated");
        Ok(cart)
    }

    /// The customer's open cart with line details resolved against the
    /// catalog (title, unit price, line totals).
    pub async fn get_cart_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<CartView, OrderError> {
        let cart = self
            .store
            .find_cart_by_customer(customer_id)
            .await?
            .ok_or(OrderError::NoOpenCart(customer_id))?;

        let mut lines = Vec::with_capacity(cart.lines.len());
        let mut total_cents = 0;
        for line in &cart.lines {
            let item = self.catalog.item(line.item_id).await?;
            let line_total_cents = item.price_cents * line.quantity;
            total_cents += line_total_cents;
            lines.push(CartLineView {
                item_id: line.item_id,
                title: item.title,
                quantity: line.quantity,
                unit_price_cents: item.price_cents,
                line_total_cents,
            });
        }

        Ok(CartView {
            order_id: cart.id,
            customer_id: cart.customer_id,
            created_at: cart.created_at,
            lines,
            total_cents,
        })
    }

    /// Delete every cart inactive beyond the retention window. Pure cleanup;
    /// a cart never touched stock or payments.
    pub async fn remove_expired_carts(&self, retention: Duration) -> Result<u64, OrderError> {
        let cutoff = Utc::now() - retention;
        let deleted = self.store.delete_expired_carts(cutoff).await?;
        if deleted > 0 {
            self.metrics.carts_swept.inc_by(deleted);
        }
        Ok(deleted)
    }

    /// An order addressed as a cart must exist *and* be in Cart status; a
    /// non-cart order is reported as cart-not-found, not as a state error.
    async fn fetch_cart(&self, order_id: OrderId) -> Result<Order, OrderError> {
        match self.store.fetch(order_id).await? {
            Some(order) if order.status == OrderStatus::Cart => Ok(order),
            _ => Err(OrderError::CartNotFound(order_id)),
        }
    }

    async fn checked_stock(
        &self,
        item_id: ItemId,
        quantity: i64,
        operation: &str,
    ) -> Result<(), OrderError> {
        match self.ledger.check(item_id, quantity).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(err, OrderError::InsufficientStock { .. }) {
                    self.metrics
                        .stock_rejections
                        .with_label_values(&[operation])
                        .inc();
                }
                Err(err)
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
