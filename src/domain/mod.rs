// ============================================================================
// Domain - Order/Payment Aggregates and Shared Identifiers
// ============================================================================

pub mod order;
pub mod payment;

/// Identifier of an order (assigned by the store on creation).
pub type OrderId = i64;

/// Identifier of a customer (owned by the identity subsystem).
pub type CustomerId = i64;

/// Identifier of a catalog item (owned by the catalog subsystem).
pub type ItemId = i64;
