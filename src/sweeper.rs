use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::domain::order::OrderError;
use crate::metrics::Metrics;
use crate::services::CartService;

// ============================================================================
// Cart Expiration Sweeper
// ============================================================================
//
// A long-lived background task that deletes Cart-status orders older than
// the retention window. It never blocks request paths and is single-flight
// by construction: the next tick is scheduled only after the current run
// completes (full-period wait), never on a wall-clock cadence.
//
// A failing run is logged and retried on the next tick, not immediately.
// Shutdown is honored between runs; a run itself is a short bounded batch
// delete and is never interrupted mid-flight. Missed runs after a restart
// are fine: sweeping is idempotent and the next run catches up.
//
// ============================================================================

pub struct CartSweeper {
    carts: Arc<CartService>,
    metrics: Arc<Metrics>,
    /// Wait between the end of one run and the start of the next.
    period: Duration,
    /// Carts older than this are reclaimed.
    retention: chrono::Duration,
}

impl CartSweeper {
    pub fn new(
        carts: Arc<CartService>,
        metrics: Arc<Metrics>,
        period: Duration,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            carts,
            metrics,
            period,
            retention,
        }
    }

    /// One sweep: delete expired carts, log and count the outcome.
    pub async fn run_once(&self) -> Result<u64, OrderError> {
        let run_id = Uuid::new_v4();
        match self.carts.remove_expired_carts(self.retention).await {
            Ok(deleted) => {
                self.metrics.sweeper_runs.with_label_values(&["ok"]).inc();
                tracing::info!(run_id = %run_id, deleted, "Cart sweep complete");
                Ok(deleted)
            }
            Err(err) => {
                self.metrics
                    .sweeper_runs
                    .with_label_values(&["error"])
                    .inc();
                tracing::error!(
                    run_id = %run_id,
                    error = %err,
                    "Cart sweep failed; will retry on the next tick"
                );
                Err(err)
            }
        }
    }

    /// Start the background loop. Flip the watch value to `true` (or drop
    /// the sender) to stop it; the handle resolves once the loop exits.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                period_secs = self.period.as_secs(),
                retention_days = self.retention.num_days(),
                "Cart sweeper started"
            );
            loop {
                if *shutdown.borrow() {
                    break;
                }

                // Errors are fully handled inside run_once; the loop only
                // cares that the run finished.
                let _ = self.run_once().await;

                tokio::select! {
                    _ = sleep(self.period) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("Cart sweeper stopped");
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CustomerId;
    use crate::store::{MemoryCatalog, MemoryCustomers, MemoryStore, OrderStore};
    use chrono::Utc;

    const SENTINEL: CustomerId = 0;

    fn services() -> (Arc<CartService>, Arc<MemoryStore>, Arc<Metrics>) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let customers = Arc::new(MemoryCustomers::new(SENTINEL));
        let metrics = Arc::new(Metrics::new().unwrap());

        customers.seed_customer_aged(1, 30);
        customers.seed_customer_aged(2, 30);
        catalog.seed_item(5, "The Rust Programming Language", 3000, 0, 100);

        let carts = Arc::new(CartService::new(
            store.clone(),
            catalog,
            customers,
            metrics.clone(),
        ));
        (carts, store, metrics)
    }

    async fn backdate(store: &MemoryStore, order_id: i64, days: i64) {
        let mut order = store.fetch(order_id).await.unwrap().unwrap();
        order.created_at = Utc::now() - chrono::Duration::days(days);
        store.save(&order, order.status).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_stale_carts() {
        let (carts, store, _) = services();

        let stale = carts.create_cart(1, 5, 1).await.unwrap();
        let fresh = carts.create_cart(2, 5, 1).await.unwrap();
        backdate(&store, stale.id, 31).await;
        backdate(&store, fresh.id, 29).await;

        let sweeper = CartSweeper::new(
            carts,
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(1),
            chrono::Duration::days(30),
        );

        assert_eq!(sweeper.run_once().await.unwrap(), 1);
        assert!(store.fetch(stale.id).await.unwrap().is_none());
        assert!(store.fetch(fresh.id).await.unwrap().is_some());

        // Idempotent: a second run finds nothing left
        assert_eq!(sweeper.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_never_touches_placed_orders() {
        let (carts, store, _) = services();

        let order = carts.create_cart(1, 5, 1).await.unwrap();
        let mut placed = store.fetch(order.id).await.unwrap().unwrap();
        placed
            .transition(crate::domain::order::OrderStatus::Pending, Utc::now())
            .unwrap();
        store
            .save(&placed, crate::domain::order::OrderStatus::Cart)
            .await
            .unwrap();
        backdate(&store, placed.id, 365).await;

        let sweeper = CartSweeper::new(
            carts,
            Arc::new(Metrics::new().unwrap()),
            Duration::from_secs(1),
            chrono::Duration::days(30),
        );
        assert_eq!(sweeper.run_once().await.unwrap(), 0);
        assert!(store.fetch(placed.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawned_loop_honors_shutdown() {
        let (carts, _, metrics) = services();
        let sweeper = CartSweeper::new(
            carts,
            metrics,
            Duration::from_secs(3600),
            chrono::Duration::days(30),
        );

        let (tx, rx) = watch::channel(false);
        let handle = sweeper.spawn(rx);

        // Let the first run happen, then stop
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }
}
