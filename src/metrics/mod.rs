use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Counters for the hot paths of the order core:
// - Cart lifecycle (created, swept)
// - Order lifecycle (confirmed, cancelled)
// - Business-rule rejections (insufficient stock, per operation)
// - Sweeper runs, by outcome
//
// The registry is exposed for whatever exporter the host process wires up.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Cart lifecycle
    pub carts_created: IntCounter,
    pub carts_swept: IntCounter,

    // Order lifecycle
    pub orders_confirmed: IntCounter,
    pub orders_cancelled: IntCounter,

    // Business-rule rejections
    pub stock_rejections: IntCounterVec,

    // Sweeper
    pub sweeper_runs: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let carts_created = IntCounter::new("carts_created_total", "Total carts created")?;
        registry.register(Box::new(carts_created.clone()))?;

        let carts_swept = IntCounter::new(
            "carts_swept_total",
            "Total abandoned carts deleted by the sweeper",
        )?;
        registry.register(Box::new(carts_swept.clone()))?;

        let orders_confirmed =
            IntCounter::new("orders_confirmed_total", "Total orders confirmed")?;
        registry.register(Box::new(orders_confirmed.clone()))?;

        let orders_cancelled =
            IntCounter::new("orders_cancelled_total", "Total orders cancelled")?;
        registry.register(Box::new(orders_cancelled.clone()))?;

        let stock_rejections = IntCounterVec::new(
            Opts::new(
                "stock_rejections_total",
                "Operations rejected for insufficient stock",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(stock_rejections.clone()))?;

        let sweeper_runs = IntCounterVec::new(
            Opts::new("sweeper_runs_total", "Cart sweeper runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(sweeper_runs.clone()))?;

        Ok(Self {
            registry,
            carts_created,
            carts_swept,
            orders_confirmed,
            orders_cancelled,
            stock_rejections,
            sweeper_runs,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
