use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookshop_orders::config::Config;
use bookshop_orders::domain::payment::PaymentType;
use bookshop_orders::metrics::Metrics;
use bookshop_orders::ports::Catalog;
use bookshop_orders::store::{MemoryCatalog, MemoryCustomers, MemoryStore};
use bookshop_orders::{CartService, CartSweeper, OrderQueries, OrderService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bookshop_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting bookshop order core demo");

    let config = Config::from_env();

    // === 1. In-memory fixtures standing in for catalog and identity ===
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let customers = Arc::new(MemoryCustomers::new(0));

    customers.seed_customer_aged(1, 34);
    catalog.seed_item(5, "The Name of the Wind", 1800, 0, 10);
    catalog.seed_item(6, "Berserk Deluxe Vol. 1", 4500, 18, 4);

    // === 2. Metrics + services ===
    let metrics = Arc::new(Metrics::new()?);
    let carts = Arc::new(CartService::new(
        store.clone(),
        catalog.clone(),
        customers.clone(),
        metrics.clone(),
    ));
    let orders = OrderService::new(
        store.clone(),
        catalog.clone(),
        customers.clone(),
        metrics.clone(),
    );
    let queries = OrderQueries::new(store.clone(), catalog.clone());

    // === 3. Start the cart sweeper with an explicit stop handle ===
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = CartSweeper::new(
        carts.clone(),
        metrics.clone(),
        config.sweep_period,
        config.cart_retention(),
    );
    let sweeper_handle = sweeper.spawn(shutdown_rx);

    // === 4. Full order lifecycle ===
    let cart = carts.create_cart(1, 5, 3).await?;
    tracing::info!("✅ Cart created: {}", cart.id);

    let view = carts.get_cart_by_customer(1).await?;
    tracing::info!(
        total_cents = view.total_cents,
        lines = view.lines.len(),
        "🛒 Cart contents"
    );

    orders.checkout(cart.id).await?;
    tracing::info!("✅ Order checked out: {}", cart.id);

    let (order, payment) = orders.confirm(cart.id, PaymentType::Card).await?;
    tracing::info!(
        amount_cents = payment.amount_cents,
        stock_left = catalog.stock(5).await?,
        "✅ Order confirmed: {}",
        order.id
    );

    for status in [
        bookshop_orders::OrderStatus::Preparation,
        bookshop_orders::OrderStatus::Shipped,
        bookshop_orders::OrderStatus::Delivered,
    ] {
        let order = orders.change_status(cart.id, status).await?;
        tracing::info!("📦 Order {} is now {}", order.id, order.status);
    }

    let details = queries.order_details(cart.id).await?;
    tracing::info!(
        "🧾 Final order view: {}",
        serde_json::to_string_pretty(&details)?
    );

    // === 5. Graceful shutdown ===
    shutdown_tx.send(true)?;
    sweeper_handle.await?;

    tracing::info!("🎉 Demo complete!");
    Ok(())
}
