use std::time::Duration;

// ============================================================================
// Runtime Configuration
// ============================================================================
//
// Environment-driven, with defaults matching the production behavior:
// carts are retained 30 days and swept once per 24 hours.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Wait between sweeper runs (measured from run completion).
    pub sweep_period: Duration,
    /// Carts older than this many days are reclaimed.
    pub cart_retention_days: i64,
    /// Postgres connection string; `None` runs on the in-memory store.
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_period: Duration::from_secs(24 * 60 * 60),
            cart_retention_days: 30,
            database_url: None,
        }
    }
}

impl Config {
    /// Read overrides from the environment; anything unset or unparseable
    /// keeps its default (with a warning, never a crash).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("BOOKSHOP_SWEEP_PERIOD_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config.sweep_period = Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(value = %raw, "Ignoring invalid BOOKSHOP_SWEEP_PERIOD_SECS")
                }
            }
        }
        if let Ok(raw) = std::env::var("BOOKSHOP_CART_RETENTION_DAYS") {
            match raw.parse::<i64>() {
                Ok(days) if days > 0 => config.cart_retention_days = days,
                _ => tracing::warn!(value = %raw, "Ignoring invalid BOOKSHOP_CART_RETENTION_DAYS"),
            }
        }
        if let Ok(url) = std::env::var("BOOKSHOP_DATABASE_URL") {
            if !url.is_empty() {
                config.database_url = Some(url);
            }
        }

        config
    }

    pub fn cart_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.cart_retention_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sweep_period, Duration::from_secs(86400));
        assert_eq!(config.cart_retention().num_days(), 30);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_from_env_applies_overrides_and_ignores_garbage() {
        std::env::set_var("BOOKSHOP_SWEEP_PERIOD_SECS", "3600");
        std::env::set_var("BOOKSHOP_CART_RETENTION_DAYS", "not-a-number");
        std::env::set_var("BOOKSHOP_DATABASE_URL", "postgres://localhost/bookshop");

        let config = Config::from_env();
        assert_eq!(config.sweep_period, Duration::from_secs(3600));
        // Unparseable retention keeps the default instead of crashing
        assert_eq!(config.cart_retention_days, 30);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/bookshop")
        );

        std::env::remove_var("BOOKSHOP_SWEEP_PERIOD_SECS");
        std::env::remove_var("BOOKSHOP_CART_RETENTION_DAYS");
        std::env::remove_var("BOOKSHOP_DATABASE_URL");
    }
}
