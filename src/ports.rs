use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order::OrderError;
use crate::domain::{CustomerId, ItemId};

// ============================================================================
// External Collaborator Ports
// ============================================================================
//
// The catalog (books, prices, stock) and the identity subsystem (customers)
// are owned elsewhere. The order core consumes them through these two narrow
// traits and never mutates anything behind them except item stock, which it
// touches exclusively through `decrement_stock`/`restock`.
//
// ============================================================================

/// The slice of a catalog item the order core needs: price, age gate, title
/// for read-side views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub title: String,
    pub price_cents: i64,
    pub minimum_age: u32,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Current snapshot of the item, or `ItemNotFound`.
    async fn item(&self, item_id: ItemId) -> Result<ItemSnapshot, OrderError>;

    /// Current available units for the item.
    async fn stock(&self, item_id: ItemId) -> Result<i64, OrderError>;

    /// Atomically take `quantity` units. Fails with `InsufficientStock` if
    /// fewer units are available; stock is left untouched in that case.
    /// Implementations must serialize concurrent decrements (single lock or
    /// conditional update), never read-then-write.
    async fn decrement_stock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError>;

    /// Return `quantity` units. Only used to compensate a partially applied
    /// multi-line decrement; cancellation after confirmation never restocks.
    async fn restock(&self, item_id: ItemId, quantity: i64) -> Result<(), OrderError>;
}

#[async_trait]
pub trait Customers: Send + Sync {
    async fn exists(&self, customer_id: CustomerId) -> Result<bool, OrderError>;

    /// Age in whole years, computed from the date of birth at call time
    /// (never cached). Fails with `CustomerNotFound` for unknown ids.
    async fn age(&self, customer_id: CustomerId) -> Result<u32, OrderError>;

    /// The sentinel deleted-customer record that absorbs the order history
    /// of deleted accounts. Resolved once; always a real row.
    fn sentinel_id(&self) -> CustomerId;

    fn is_sentinel(&self, customer_id: CustomerId) -> bool {
        customer_id == self.sentinel_id()
    }
}
