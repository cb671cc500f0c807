//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("An upstream secret requires trust_proxy_headers")]
    UpstreamSecretWithoutProxyTrust,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Counter store timeout must be between 1 and 5000 ms")]
    InvalidStoreTimeout,

    #[error("Ledger timeout must be between 1 and 30000 ms")]
    InvalidLedgerTimeout,

    #[error("Sweep interval must be non-zero")]
    InvalidSweepInterval,

    #[error("Rate limit for {0} must be at least 2 so the fallback limit is lower")]
    RateLimitTooLow(&'static str),

    #[error("Rate limit window for {0} must be non-zero")]
    ZeroWindow(&'static str),

    #[error("Fallback ratio must be between 1 and 99 percent")]
    InvalidFallbackRatio,

    #[error("Fallback cache must hold at least one entry")]
    InvalidFallbackCapacity,

    #[error("Unknown feature in quota configuration: {0}")]
    UnknownQuotaFeature(String),

    #[error("Trial length must be between 1 and 3650 days")]
    InvalidTrialDays,

    #[error("Unknown anonymous feature: {0}")]
    UnknownAnonymousFeature(String),

    #[error("Invalid privileged identity: {0}")]
    InvalidPrivilegedIdentity(String),
}
