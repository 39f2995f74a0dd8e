// ============================================================================
// bookshop-orders - Order/Cart Lifecycle & Inventory Consistency Core
// ============================================================================
//
// The order-processing backend of an online bookshop, reduced to the part
// with real invariants:
// - Order state machine (Cart -> Pending -> Confirmed -> ... -> Delivered)
// - Cart management with a single open cart per customer
// - Stock decrement protocol that never oversells
// - Background sweeper that reclaims abandoned carts
//
// Catalog data and customer identity are external collaborators, consumed
// through the narrow ports in `ports`.
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod inventory;
pub mod metrics;
pub mod ports;
pub mod services;
pub mod store;
pub mod sweeper;

pub use domain::order::{LineItem, Order, OrderError, OrderStatus};
pub use domain::payment::{Payment, PaymentType};
pub use domain::{CustomerId, ItemId, OrderId};
pub use inventory::InventoryLedger;
pub use services::{CartService, OrderQueries, OrderService};
pub use sweeper::CartSweeper;
