// ============================================================================
// Services - Orchestration over Store, Ledger, and Ports
// ============================================================================
//
// - CartService: the single open cart per customer and its line items
// - OrderService: the status state machine and its side effects
// - OrderQueries: read-side projections (summaries, detail views, listings)
//
// ============================================================================

pub mod cart_service;
pub mod order_service;
pub mod queries;

pub use cart_service::{CartLineView, CartService, CartView};
pub use order_service::OrderService;
pub use queries::{OrderDetails, OrderLineView, OrderQueries, OrderSummary};
