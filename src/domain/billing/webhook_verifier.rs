//! Payment webhook signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 and sends the
//! lowercase hex digest in `X-Signature`, optionally prefixed `sha256=`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::payment_event::PaymentEvent;
use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Verifier for payment webhook signatures.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    /// Creates a new verifier with the shared signing secret.
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature over `payload`, then parses the event.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` - header malformed or digest mismatch
    /// - `ParseError` / `MissingField` - body is not a valid event
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<PaymentEvent, WebhookError> {
        self.verify(payload, signature)?;
        PaymentEvent::from_slice(payload)
    }

    /// Checks `signature` against the payload with a constant-time comparison.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<(), WebhookError> {
        let provided = decode_signature(signature)?;
        let expected = compute_signature(self.secret.expose_secret().as_bytes(), payload)?;

        if !constant_time_compare(&expected, &provided) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Produces the `X-Signature` value for `payload`.
///
/// Used by tests and by operators replaying events by hand.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    match compute_signature(secret.as_bytes(), payload) {
        Ok(digest) => hex::encode(digest),
        Err(_) => String::new(),
    }
}

fn decode_signature(header: &str) -> Result<Vec<u8>, WebhookError> {
    let trimmed = header.trim();
    let hex_part = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);
    if hex_part.is_empty() {
        return Err(WebhookError::InvalidSignature);
    }
    hex::decode(hex_part).map_err(|_| WebhookError::InvalidSignature)
}

fn compute_signature(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
