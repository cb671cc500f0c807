//! HTTP listener, logging, and proxy settings

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::ValidationError;

/// Longest request deadline accepted; access checks are meant to be fast.
const MAX_REQUEST_TIMEOUT_SECS: u64 = 120;

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,

    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub log_level: String,

    /// Output format; follows the environment when unset
    pub log_format: Option<LogFormat>,

    /// Deadline for a whole request, in seconds
    pub request_timeout_secs: u64,

    /// Believe `X-Identity-Id`, `X-Forwarded-For` and `X-Real-IP`.
    /// Enable only behind a proxy that sets or strips those headers.
    pub trust_proxy_headers: bool,

    /// Shared secret the proxy sends in `X-Upstream-Secret`; when set,
    /// proxy headers on requests without it are ignored
    pub upstream_secret: Option<SecretString>,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ValidationError::InvalidBindAddress(addr))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Configured format, or JSON in production and pretty elsewhere.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or(if self.is_production() {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidTimeout);
        }
        if let Some(secret) = &self.upstream_secret {
            if secret.expose_secret().trim().is_empty() {
                return Err(ValidationError::MissingRequired("SERVER__UPSTREAM_SECRET"));
            }
            if !self.trust_proxy_headers {
                return Err(ValidationError::UpstreamSecretWithoutProxyTrust);
            }
        }
        self.socket_addr().map(|_| ())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::default(),
            log_level: "info,access_meter=debug,sqlx=warn".to_string(),
            log_format: None,
            request_timeout_secs: 10,
            trust_proxy_headers: false,
            upstream_secret: None,
        }
    }
}
