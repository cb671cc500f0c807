//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `ACCESS_METER_` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use access_meter::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod entitlement;
mod error;
mod payment;
mod quota;
mod rate_limit;
mod redis;
mod server;
mod store;

pub use database::DatabaseConfig;
pub use entitlement::EntitlementConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use quota::QuotaConfig;
pub use rate_limit::RateLimitConfig;
pub use redis::RedisConfig;
pub use server::{Environment, LogFormat, ServerConfig};
pub use store::{StoreBackend, StoreConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Redis configuration (only read for the Redis counter backend)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Counter store backend and timeouts
    #[serde(default)]
    pub store: StoreConfig,

    /// Request budgets
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-feature allowances
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Trial length and privileged identities
    #[serde(default)]
    pub entitlement: EntitlementConfig,

    /// Payment webhook settings
    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `ACCESS_METER` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `ACCESS_METER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ACCESS_METER__DATABASE__URL=...` -> `database.url = ...`
    /// - `ACCESS_METER__RATE_LIMIT__ANONYMOUS_LIMIT=20` -> `rate_limit.anonymous_limit = 20`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ACCESS_METER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        if self.store.backend == StoreBackend::Redis {
            self.redis.validate()?;
        }
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.quota.validate()?;
        self.entitlement.validate()?;
        self.payment.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
