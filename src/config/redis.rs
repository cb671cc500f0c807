//! Redis connection settings, read only for the Redis counter backend.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL; may carry a password
    pub url: Option<SecretString>,

    /// Bound on establishing the connection at startup, in seconds
    pub connect_timeout_secs: u64,
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self
            .url
            .as_ref()
            .map(|u| u.expose_secret().as_str())
            .filter(|u| !u.trim().is_empty())
            .ok_or(ValidationError::MissingRequired("REDIS_URL"))?;
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(ValidationError::InvalidRedisUrl);
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_secs: 5,
        }
    }
}
