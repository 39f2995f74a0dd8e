use serde::{Deserialize, Serialize};

use crate::domain::ItemId;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One (item, quantity) pairing inside an order. An item appears at most
/// once per order; quantity is always > 0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LineItem {
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Lifecycle status of an order. `Cart` is the only status in which line
/// items may be modified; `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Cart,
    Pending,
    Confirmed,
    Preparation,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The single legal forward edge out of this status, or `None` for
    /// terminal statuses. `Cancelled` is a side edge out of `Confirmed` and
    /// is intentionally not part of the forward chain.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Cart => Some(Self::Pending),
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparation),
            Self::Preparation => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    /// Returns `true` if no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Stable textual form used by the relational store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "Cart",
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Preparation => "Preparation",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }

    pub const ALL: [Self; 7] = [
        Self::Cart,
        Self::Pending,
        Self::Confirmed,
        Self::Preparation,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cart" => Ok(Self::Cart),
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Preparation" => Ok(Self::Preparation),
            "Shipped" => Ok(Self::Shipped),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
