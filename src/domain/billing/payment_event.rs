//! Payment provider event payloads.
//!
//! Wire format:
//!
//! ```json
//! {"id": "evt_123", "type": "payment.succeeded",
//!  "data": {"identity_id": "u1", "tier": "plus"}}
//! ```

use serde::{Deserialize, Serialize};

use super::WebhookError;
use crate::domain::entitlement::SubscriptionTier;
use crate::domain::foundation::IdentityId;

/// Event document delivered by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider's unique event id; the idempotency key.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: PaymentEventData,
}

/// Event body fields this service reads. Other fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEventData {
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

/// Event types this service acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventType {
    PaymentSucceeded,
    CheckoutCompleted,
    SubscriptionUpdated,
    SubscriptionCancelled,
    Unknown(String),
}

impl PaymentEventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "payment.succeeded" => PaymentEventType::PaymentSucceeded,
            "checkout.completed" => PaymentEventType::CheckoutCompleted,
            "subscription.updated" => PaymentEventType::SubscriptionUpdated,
            "subscription.cancelled" | "subscription.canceled" => {
                PaymentEventType::SubscriptionCancelled
            }
            other => PaymentEventType::Unknown(other.to_string()),
        }
    }
}

/// Mutation an event applies to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementChange {
    /// Set a paid tier and reset usage baselines.
    Grant {
        identity_id: IdentityId,
        tier: SubscriptionTier,
    },
    /// Drop to the expired tier and reset usage baselines.
    Revoke { identity_id: IdentityId },
}

impl EntitlementChange {
    pub fn identity_id(&self) -> &IdentityId {
        match self {
            EntitlementChange::Grant { identity_id, .. } => identity_id,
            EntitlementChange::Revoke { identity_id } => identity_id,
        }
    }

    /// Tier stored after the change.
    pub fn resulting_tier(&self) -> SubscriptionTier {
        match self {
            EntitlementChange::Grant { tier, .. } => *tier,
            EntitlementChange::Revoke { .. } => SubscriptionTier::ExpiredFree,
        }
    }
}

impl PaymentEvent {
    /// Parses and checks the envelope.
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        let event: PaymentEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;
        if event.id.trim().is_empty() {
            return Err(WebhookError::MissingField("id"));
        }
        Ok(event)
    }

    pub fn kind(&self) -> PaymentEventType {
        PaymentEventType::parse(&self.event_type)
    }

    /// Entitlement mutation carried by this event, or `None` for event
    /// types that are acknowledged without effect.
    pub fn entitlement_change(&self) -> Result<Option<EntitlementChange>, WebhookError> {
        match self.kind() {
            PaymentEventType::PaymentSucceeded
            | PaymentEventType::CheckoutCompleted
            | PaymentEventType::SubscriptionUpdated => {
                let identity_id = self.identity_id()?;
                let raw_tier = self
                    .data
                    .tier
                    .as_deref()
                    .ok_or(WebhookError::MissingField("tier"))?;
                let tier = raw_tier
                    .parse::<SubscriptionTier>()
                    .map_err(|e| WebhookError::ParseError(e.to_string()))?;
                if !tier.is_paid() {
                    return Err(WebhookError::ParseError(format!(
                        "tier '{}' is not a paid tier",
                        raw_tier
                    )));
                }
                Ok(Some(EntitlementChange::Grant { identity_id, tier }))
            }
            PaymentEventType::SubscriptionCancelled => Ok(Some(EntitlementChange::Revoke {
                identity_id: self.identity_id()?,
            })),
            PaymentEventType::Unknown(_) => Ok(None),
        }
    }

    fn identity_id(&self) -> Result<IdentityId, WebhookError> {
        let raw = self
            .data
            .identity_id
            .as_deref()
            .ok_or(WebhookError::MissingField("identity_id"))?;
        IdentityId::new(raw).map_err(|_| WebhookError::MissingField("identity_id"))
    }
}
