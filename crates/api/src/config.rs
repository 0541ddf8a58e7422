//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::{Money, PricingPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — PostgreSQL connection string; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `TAX_RATE_BPS`, `SHIPPING_FLAT_CENTS`, `FREE_SHIPPING_THRESHOLD_CENTS`,
///   `TOTAL_TOLERANCE_CENTS` — pricing policy overrides
/// - `PAYMENT_SWEEP_INTERVAL_SECS` — how often stale payments are expired (default: `60`)
/// - `PAYMENT_EXPIRY_SECS` — age after which an unanswered prompt expires (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub pricing: PricingPolicy,
    pub payment_sweep_interval: Duration,
    pub payment_expiry: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());

        let pricing = PricingPolicy {
            tax_rate_bps: parsed("TAX_RATE_BPS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.pricing.tax_rate_bps),
            shipping_flat: parsed("SHIPPING_FLAT_CENTS")
                .map(Money::from_cents)
                .unwrap_or(defaults.pricing.shipping_flat),
            // A negative threshold disables free shipping.
            free_shipping_threshold: match parsed("FREE_SHIPPING_THRESHOLD_CENTS") {
                Some(cents) if cents < 0 => None,
                Some(cents) => Some(Money::from_cents(cents)),
                None => defaults.pricing.free_shipping_threshold,
            },
            tolerance: parsed("TOTAL_TOLERANCE_CENTS")
                .map(Money::from_cents)
                .unwrap_or(defaults.pricing.tolerance),
        };

        let secs = |key: &str, default: Duration| {
            parsed(key)
                .and_then(|v| u64::try_from(v).ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.database_max_connections),
            pricing,
            payment_sweep_interval: secs(
                "PAYMENT_SWEEP_INTERVAL_SECS",
                defaults.payment_sweep_interval,
            ),
            payment_expiry: secs("PAYMENT_EXPIRY_SECS", defaults.payment_expiry),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            pricing: PricingPolicy::default(),
            payment_sweep_interval: Duration::from_secs(60),
            payment_expiry: Duration::from_secs(300),
        }
    }
}
