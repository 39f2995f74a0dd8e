// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (OrderStatus with its transition table, LineItem)
// - Errors (OrderError enum with the NotFound/BadRequest taxonomy)
// - Aggregate (Order with timestamps, line items, and transitions)
//
// Stock and customer data live behind the ports in `crate::ports`; the
// aggregate never talks to them directly.
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod value_objects;

// Re-export for convenience
pub use aggregate::*;
pub use errors::*;
pub use value_objects::*;
