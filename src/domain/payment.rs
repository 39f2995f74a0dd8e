use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::OrderId;

// ============================================================================
// Payment Record
// ============================================================================
//
// Created exactly once per order, at the Pending -> Confirmed transition,
// for the order's total at confirmation time. Immutable once created; this
// subsystem never updates or deletes payments.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Cash,
    Card,
    BankTransfer,
}

impl PaymentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::Card => "Card",
            Self::BankTransfer => "BankTransfer",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(Self::Cash),
            "Card" => Ok(Self::Card),
            "BankTransfer" => Ok(Self::BankTransfer),
            other => Err(format!("unknown payment type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    /// Order total at confirmation time, in cents.
    pub amount_cents: i64,
    pub payment_type: PaymentType,
    pub recorded_at: DateTime<Utc>,
}

/// A payment about to be persisted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount_cents: i64,
    pub payment_type: PaymentType,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_type_round_trips_through_text() {
        for payment_type in [
            PaymentType::Cash,
            PaymentType::Card,
            PaymentType::BankTransfer,
        ] {
            let parsed: PaymentType = payment_type.as_str().parse().unwrap();
            assert_eq!(parsed, payment_type);
        }
        assert!("Barter".parse::<PaymentType>().is_err());
    }
}
