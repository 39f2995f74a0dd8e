use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{LineItem, OrderStatus};
use crate::domain::{CustomerId, ItemId, OrderId};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// An Order is either an in-progress cart or a placed order, depending on its
// status. The aggregate owns:
// 1. The transition table (exactly one legal forward edge per status, plus
//    the Confirmed -> Cancelled side edge)
// 2. The lifecycle timestamps, each set exactly once when its transition fires
// 3. Line-item bookkeeping (item unique per order, quantity > 0)
//
// Stock checks, payments, and persistence are orchestrated by the services;
// the aggregate stays pure.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub customer_id: CustomerId,

    // Current state
    pub status: OrderStatus,
    pub lines: Vec<LineItem>,

    // Lifecycle timestamps
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub preparation_started_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A fresh, empty cart for `customer_id`.
    pub fn new_cart(id: OrderId, customer_id: CustomerId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id,
            status: OrderStatus::Cart,
            lines: Vec::new(),
            created_at,
            confirmed_at: None,
            preparation_started_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    pub fn line(&self, item_id: ItemId) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Quantity currently held for `item_id` (0 if the item is not a line).
    pub fn quantity_of(&self, item_id: ItemId) -> i64 {
        self.line(item_id).map_or(0, |l| l.quantity)
    }

    /// Set the absolute quantity for `item_id`, adding the line if absent.
    pub fn set_line(&mut self, item_id: ItemId, quantity: i64) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item_id) {
            line.quantity = quantity;
        } else {
            self.lines.push(LineItem { item_id, quantity });
        }
    }

    /// Remove the line for `item_id`. Returns `false` if there was none.
    pub fn remove_line(&mut self, item_id: ItemId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        self.lines.len() < before
    }

    /// The latest non-null lifecycle timestamp, or `created_at` if none set.
    pub fn last_updated(&self) -> DateTime<Utc> {
        [
            self.confirmed_at,
            self.preparation_started_at,
            self.shipped_at,
            self.delivered_at,
            self.cancelled_at,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(self.created_at)
    }

    /// Apply a status transition, stamping the matching timestamp.
    ///
    /// This enforces the full table:
    ///
    /// Cart -> Pending -> Confirmed -> Preparation -> Shipped -> Delivered,
    /// plus Confirmed -> Cancelled. Anything else fails with an error naming
    /// the only legal next status. Which triggers may drive which edges
    /// (checkout, confirm, cancel, advance) is service-level policy.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let cancel_edge =
            self.status == OrderStatus::Confirmed && target == OrderStatus::Cancelled;
        if self.status.next() != Some(target) && !cancel_edge {
            return Err(OrderError::invalid_transition(self.status, target));
        }

        match target {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Preparation => self.preparation_started_at = Some(now),
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            // Checkout stamps nothing; Cart is never a target.
            OrderStatus::Cart | OrderStatus::Pending => {}
        }
        self.status = target;
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cart() -> Order {
        Order::new_cart(1, 10, Utc::now())
    }

    #[test]
    fn test_line_bookkeeping() {
        let mut order = cart();
        order.set_line(5, 3);
        assert_eq!(order.quantity_of(5), 3);

        // Absolute set, not a delta
        order.set_line(5, 7);
        assert_eq!(order.quantity_of(5), 7);
        assert_eq!(order.lines.len(), 1);

        assert!(order.remove_line(5));
        assert!(!order.remove_line(5));
        assert_eq!(order.quantity_of(5), 0);
    }

    #[test]
    fn test_full_lifecycle_stamps_each_timestamp_once() {
        let mut order = cart();
        let chain = [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Preparation,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ];
        for target in chain {
            order.transition(target, Utc::now()).unwrap();
            assert_eq!(order.status, target);
        }

        assert!(order.confirmed_at.is_some());
        assert!(order.preparation_started_at.is_some());
        assert!(order.shipped_at.is_some());
        assert!(order.delivered_at.is_some());
        assert!(order.cancelled_at.is_none());

        // Monotonic: each timestamp is >= the one it followed
        assert!(order.preparation_started_at >= order.confirmed_at);
        assert!(order.shipped_at >= order.preparation_started_at);
        assert!(order.delivered_at >= order.shipped_at);
    }

    #[test]
    fn test_cancel_only_from_confirmed() {
        let mut order = cart();
        order.transition(OrderStatus::Pending, Utc::now()).unwrap();
        order
            .transition(OrderStatus::Confirmed, Utc::now())
            .unwrap();
        order
            .transition(OrderStatus::Cancelled, Utc::now())
            .unwrap();
        assert!(order.cancelled_at.is_some());

        // Terminal: nothing leaves Cancelled
        for target in OrderStatus::ALL {
            let err = order.transition(target, Utc::now()).unwrap_err();
            assert!(matches!(err, OrderError::TerminalStatus { .. }));
        }
    }

    #[test]
    fn test_transition_table_is_exhaustive() {
        // All 7 statuses x 7 targets; exactly the six table edges succeed.
        let legal = [
            (OrderStatus::Cart, OrderStatus::Pending),
            (OrderStatus::Pending, OrderStatus::Confirmed),
            (OrderStatus::Confirmed, OrderStatus::Preparation),
            (OrderStatus::Confirmed, OrderStatus::Cancelled),
            (OrderStatus::Preparation, OrderStatus::Shipped),
            (OrderStatus::Shipped, OrderStatus::Delivered),
        ];

        for from in OrderStatus::ALL {
            for target in OrderStatus::ALL {
                let mut order = cart();
                order.status = from;
                let result = order.transition(target, Utc::now());
                if legal.contains(&(from, target)) {
                    assert!(result.is_ok(), "{from} -> {target} should be legal");
                    assert_eq!(order.status, target);
                } else {
                    assert!(result.is_err(), "{from} -> {target} should be illegal");
                    assert_eq!(order.status, from, "failed transition must not mutate");
                }
            }
        }
    }

    #[test]
    fn test_last_updated_prefers_latest_timestamp() {
        let mut order = cart();
        assert_eq!(order.last_updated(), order.created_at);

        order.transition(OrderStatus::Pending, Utc::now()).unwrap();
        assert_eq!(order.last_updated(), order.created_at);

        let confirm_time = Utc::now();
        order
            .transition(OrderStatus::Confirmed, confirm_time)
            .unwrap();
        assert_eq!(order.last_updated(), confirm_time);
    }
}
