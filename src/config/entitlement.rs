//! Entitlement configuration

use serde::Deserialize;
use std::collections::HashSet;

use super::error::ValidationError;
use crate::domain::entitlement::{Feature, DEFAULT_TRIAL_DAYS};
use crate::domain::foundation::IdentityId;

/// Ten years; larger values overflow trial end arithmetic.
const MAX_TRIAL_DAYS: i64 = 3_650;

/// Trial length, privileged identities, and anonymous features.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementConfig {
    /// Days of FREE trial granted on first sight of an identity
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    /// Identities with every feature unlocked (comma-separated)
    #[serde(default)]
    pub privileged_identities: Option<String>,

    /// Features callers without an identity may use, metered by address
    /// against the anonymous budget (comma-separated)
    #[serde(default)]
    pub anonymous_features: Option<String>,
}

impl EntitlementConfig {
    /// Parsed privileged identities.
    pub fn privileged(&self) -> Result<HashSet<IdentityId>, ValidationError> {
        split_list(self.privileged_identities.as_deref())
            .map(|s| {
                IdentityId::new(s).map_err(|_| ValidationError::InvalidPrivilegedIdentity(s.to_string()))
            })
            .collect()
    }

    /// Parsed anonymous features.
    pub fn anonymous(&self) -> Result<HashSet<Feature>, ValidationError> {
        split_list(self.anonymous_features.as_deref())
            .map(|s| {
                s.parse::<Feature>()
                    .map_err(|_| ValidationError::UnknownAnonymousFeature(s.to_string()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_TRIAL_DAYS).contains(&self.trial_days) {
            return Err(ValidationError::InvalidTrialDays);
        }
        self.privileged()?;
        self.anonymous().map(|_| ())
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            privileged_identities: None,
            anonymous_features: None,
        }
    }
}

fn split_list(list: Option<&str>) -> impl Iterator<Item = &str> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn default_trial_days() -> i64 {
    DEFAULT_TRIAL_DAYS
}
