//! Usage quota configuration
//!
//! Entries are keyed by feature name and override the built-in defaults
//! one feature at a time:
//!
//! ```text
//! ACCESS_METER__QUOTA__FEATURES__CHAT__QUOTA=80
//! ACCESS_METER__QUOTA__FEATURES__CHAT__PERIOD=daily
//! ```

use serde::Deserialize;
use std::collections::HashMap;

use super::error::ValidationError;
use crate::domain::entitlement::Feature;
use crate::domain::metering::{QuotaPeriod, QuotaPolicy};

/// Per-feature allowances. Features without an entry are unmetered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaConfig {
    #[serde(default)]
    pub features: HashMap<String, QuotaPolicy>,
}

impl QuotaConfig {
    /// Defaults merged with configured overrides.
    pub fn policies(&self) -> Result<HashMap<Feature, QuotaPolicy>, ValidationError> {
        let mut policies = default_policies();
        for (name, policy) in &self.features {
            let feature = name
                .parse::<Feature>()
                .map_err(|_| ValidationError::UnknownQuotaFeature(name.clone()))?;
            policies.insert(feature, *policy);
        }
        Ok(policies)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.policies().map(|_| ())
    }
}

fn default_policies() -> HashMap<Feature, QuotaPolicy> {
    HashMap::from([
        (Feature::DocGenerator, QuotaPolicy::daily(3)),
        (Feature::Chat, QuotaPolicy::daily(50)),
        (Feature::CaseTracker, QuotaPolicy::monthly(100)),
        (Feature::AiAnalysis, QuotaPolicy::daily(10)),
    ])
}
