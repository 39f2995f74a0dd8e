use std::sync::Arc;

use crate::domain::order::{LineItem, OrderError};
use crate::domain::ItemId;
use crate::ports::Catalog;

// ============================================================================
// Inventory Ledger
// ============================================================================
//
// The sole authority on "can N units of item X be taken right now". All
// stock mutation flows through here; no service touches stock directly.
//
// `check` is advisory: it is evaluated at the moment of a cart mutation and
// re-checked at confirmation, because time passes between the two. Only
// `decrement_order` permanently removes stock, and it is all-or-nothing
// across an order's line items: the first failing line triggers a restock of
// every line already taken before the error propagates.
//
// ============================================================================

#[derive(Clone)]
pub struct InventoryLedger {
    catalog: Arc<dyn Catalog>,
}

impl InventoryLedger {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Units currently available for `item_id`.
    pub async fn available(&self, item_id: ItemId) -> Result<i64, OrderError> {
        self.catalog.stock(item_id).await
    }

    /// Fail with `InsufficientStock` unless `quantity` units are available
    /// right now. Holds no reservation.
    pub async fn check(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError> {
        let available = self.catalog.stock(item_id).await?;
        if quantity > available {
            return Err(OrderError::InsufficientStock {
                item_id,
                requested: quantity,
                available,
            });
        }
        Ok(())
    }

    /// Permanently take stock for every line of an order. If any line fails,
    /// every already-decremented line is restocked and the original error is
    /// returned: no partial decrement survives.
    pub async fn decrement_order(&self, lines: &[LineItem]) -> Result<(), OrderError> {
        let mut taken: Vec<&LineItem> = Vec::with_capacity(lines.len());

        for line in lines {
            match self.catalog.decrement_stock(line.item_id, line.quantity).await {
                Ok(()) => taken.push(line),
                Err(err) => {
                    tracing::warn!(
                        item_id = line.item_id,
                        quantity = line.quantity,
                        error = %err,
                        "Stock decrement failed, compensating earlier lines"
                    );
                    self.restock_lines(&taken).await;
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Return stock for every line. Used when a later step of confirmation
    /// fails after the decrement already happened.
    pub async fn restock_order(&self, lines: &[LineItem]) -> Result<(), OrderError> {
        for line in lines {
            self.catalog.restock(line.item_id, line.quantity).await?;
        }
        Ok(())
    }

    async fn restock_lines(&self, taken: &[&LineItem]) {
        for line in taken {
            // Compensation failure leaves stock under-counted; log loudly,
            // there is no caller that could handle it better.
            if let Err(err) = self.catalog.restock(line.item_id, line.quantity).await {
                tracing::error!(
                    item_id = line.item_id,
                    quantity = line.quantity,
                    error = %err,
                    "Failed to restock after aborted decrement"
                );
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
