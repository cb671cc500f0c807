//! Payment configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Payment provider webhook settings
#[derive(Debug, Deserialize)]
pub struct PaymentConfig {
    /// Shared secret for webhook HMAC signatures
    pub webhook_secret: SecretString,
}

impl PaymentConfig {
    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT_WEBHOOK_SECRET"));
        }
        Ok(())
    }
}
