use super::value_objects::OrderStatus;
use crate::domain::{CustomerId, ItemId, OrderId};

// ============================================================================
// Order Business Rule Errors
// ============================================================================
//
// Every error maps to one of four caller-visible categories:
// - NotFound: the referenced resource does not exist (a non-cart order
//   addressed as a cart is reported as cart-not-found, not a state error)
// - BadRequest: the request is well-formed but a business rule fails
// - Conflict: a concurrent writer won the race; reload and retry
// - Internal: storage/backend failure; never a business outcome
//
// ============================================================================

/// Caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    BadRequest,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),

    #[error("Cart {0} does not exist")]
    CartNotFound(OrderId),

    #[error("Customer {0} has no open cart")]
    NoOpenCart(CustomerId),

    #[error("Item {0} does not exist")]
    ItemNotFound(ItemId),

    #[error("Order {order_id} has no line item for item {item_id}")]
    LineItemNotFound { order_id: OrderId, item_id: ItemId },

    #[error("Customer {0} does not exist")]
    CustomerNotFound(CustomerId),

    #[error("Customer {0} already has an open cart")]
    CartAlreadyExists(CustomerId),

    #[error("Customer {0} is deleted and cannot shop")]
    DeletedCustomer(CustomerId),

    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    #[error("Customer {customer_id} is {actual} years old; item requires minimum age {required}")]
    UnderAge {
        customer_id: CustomerId,
        required: u32,
        actual: u32,
    },

    #[error("Invalid quantity: {0} (must be positive)")]
    InvalidQuantity(i64),

    #[error("Cannot move order from {from} to {requested}; the only legal next status is {legal}")]
    InvalidTransition {
        from: OrderStatus,
        requested: OrderStatus,
        legal: OrderStatus,
    },

    #[error("Order status {from} is terminal; cannot move to {requested}")]
    TerminalStatus {
        from: OrderStatus,
        requested: OrderStatus,
    },

    #[error("Order {0} is an open cart; use checkout to move it to Pending")]
    CheckoutRequired(OrderId),

    #[error("Order {0} is pending; use confirm with a payment method to move it to Confirmed")]
    PaymentRequired(OrderId),

    #[error("Order {0} was modified concurrently; reload and retry")]
    ConcurrentUpdate(OrderId),

    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl OrderError {
    /// The right transition error for an illegal `from -> requested` request.
    pub fn invalid_transition(from: OrderStatus, requested: OrderStatus) -> Self {
        match from.next() {
            Some(legal) => Self::InvalidTransition {
                from,
                requested,
                legal,
            },
            None => Self::TerminalStatus { from, requested },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OrderNotFound(_)
            | Self::CartNotFound(_)
            | Self::NoOpenCart(_)
            | Self::ItemNotFound(_)
            | Self::LineItemNotFound { .. }
            | Self::CustomerNotFound(_) => ErrorCategory::NotFound,

            Self::CartAlreadyExists(_)
            | Self::DeletedCustomer(_)
            | Self::InsufficientStock { .. }
            | Self::UnderAge { .. }
            | Self::InvalidQuantity(_)
            | Self::InvalidTransition { .. }
            | Self::TerminalStatus { .. }
            | Self::CheckoutRequired(_)
            | Self::PaymentRequired(_) => ErrorCategory::BadRequest,

            Self::ConcurrentUpdate(_) => ErrorCategory::Conflict,

            Self::Storage(_) => ErrorCategory::Internal,
        }
    }
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.into())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
