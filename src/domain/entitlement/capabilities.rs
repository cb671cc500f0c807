//! Canonical tier → capability table.
//!
//! One table for the whole process. Tiers are strictly additive:
//! every feature a lower tier grants is granted by each tier ranked above it.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::{Feature, SubscriptionTier};

static STANDARD: Lazy<CapabilityTable> = Lazy::new(CapabilityTable::standard);

/// Problems detected when validating a capability table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityTableError {
    #[error("Tier {0:?} has no capability entry")]
    MissingTier(SubscriptionTier),

    #[error("Expired trial tier must grant nothing, found {0}")]
    ExpiredTierNotEmpty(Feature),

    #[error("{higher:?} does not include {feature} granted by {lower:?}")]
    NotNested {
        lower: SubscriptionTier,
        higher: SubscriptionTier,
        feature: Feature,
    },
}

/// Mapping from every tier to the features it unlocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    grants: BTreeMap<SubscriptionTier, BTreeSet<Feature>>,
}

impl CapabilityTable {
    /// Returns the process-wide table.
    pub fn global() -> &'static CapabilityTable {
        &STANDARD
    }

    /// Builds the standard table.
    ///
    /// | Tier         | Adds                        |
    /// |--------------|-----------------------------|
    /// | ExpiredFree  | nothing                     |
    /// | Free         | DOC_GENERATOR, CHAT         |
    /// | Basic        | CASE_TRACKER                |
    /// | Plus         | AI_ANALYSIS, EXPORT         |
    /// | Pro          | API_ACCESS                  |
    pub fn standard() -> Self {
        let free: BTreeSet<Feature> = [Feature::DocGenerator, Feature::Chat].into_iter().collect();

        let mut basic = free.clone();
        basic.insert(Feature::CaseTracker);

        let mut plus = basic.clone();
        plus.extend([Feature::AiAnalysis, Feature::Export]);

        let mut pro = plus.clone();
        pro.insert(Feature::ApiAccess);

        Self::from_grants([
            (SubscriptionTier::ExpiredFree, BTreeSet::new()),
            (SubscriptionTier::Free, free),
            (SubscriptionTier::Basic, basic),
            (SubscriptionTier::Plus, plus),
            (SubscriptionTier::Pro, pro),
        ])
    }

    /// Builds a table from explicit per-tier grants. Call `validate` before use.
    pub fn from_grants(
        grants: impl IntoIterator<Item = (SubscriptionTier, BTreeSet<Feature>)>,
    ) -> Self {
        Self {
            grants: grants.into_iter().collect(),
        }
    }

    /// Features unlocked by `tier`. Unknown tiers unlock nothing.
    pub fn features_for(&self, tier: SubscriptionTier) -> BTreeSet<Feature> {
        self.grants.get(&tier).cloned().unwrap_or_default()
    }

    /// Returns true if `tier` unlocks `feature`.
    pub fn grants(&self, tier: SubscriptionTier, feature: Feature) -> bool {
        self.grants
            .get(&tier)
            .map(|set| set.contains(&feature))
            .unwrap_or(false)
    }

    /// Lowest-ranked tier that unlocks `feature`, if any.
    pub fn minimum_tier_for(&self, feature: Feature) -> Option<SubscriptionTier> {
        SubscriptionTier::ALL
            .into_iter()
            .find(|tier| self.grants(*tier, feature))
    }

    /// Every known feature. Used for privileged identities.
    pub fn full(&self) -> BTreeSet<Feature> {
        Feature::ALL.into_iter().collect()
    }

    /// Checks completeness and strict nesting.
    pub fn validate(&self) -> Result<(), CapabilityTableError> {
        for tier in SubscriptionTier::ALL {
            if !self.grants.contains_key(&tier) {
                return Err(CapabilityTableError::MissingTier(tier));
            }
        }

        if let Some(feature) = self
            .features_for(SubscriptionTier::ExpiredFree)
            .into_iter()
            .next()
        {
            return Err(CapabilityTableError::ExpiredTierNotEmpty(feature));
        }

        for pair in SubscriptionTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            for feature in self.features_for(lower) {
                if !self.grants(higher, feature) {
                    return Err(CapabilityTableError::NotNested {
                        lower,
                        higher,
                        feature,
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::standard()
    }
}
