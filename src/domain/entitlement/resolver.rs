//! Entitlement resolution.
//!
//! Pure functions from an entitlement snapshot to the features it unlocks.
//! Nothing here mutates the entitlement or touches storage.

use std::collections::{BTreeSet, HashSet};

use super::{CapabilityTable, Feature, SubscriberEntitlement, SubscriptionTier};
use crate::domain::foundation::{IdentityId, Timestamp};
use crate::domain::metering::AccessError;

/// Resolves capabilities against a capability table and a set of
/// operator identities that always receive every feature.
#[derive(Debug, Clone)]
pub struct EntitlementResolver {
    table: &'static CapabilityTable,
    privileged: HashSet<IdentityId>,
}

impl EntitlementResolver {
    pub fn new(table: &'static CapabilityTable) -> Self {
        Self {
            table,
            privileged: HashSet::new(),
        }
    }

    /// Adds identities that resolve to the full capability set.
    pub fn with_privileged(mut self, identities: impl IntoIterator<Item = IdentityId>) -> Self {
        self.privileged.extend(identities);
        self
    }

    pub fn table(&self) -> &'static CapabilityTable {
        self.table
    }

    /// Returns true if `entitlement` bypasses tier checks.
    pub fn is_privileged(&self, entitlement: &SubscriberEntitlement) -> bool {
        entitlement.privileged_override || self.privileged.contains(&entitlement.identity_id)
    }

    /// Features unlocked for `entitlement` at `now`.
    pub fn resolve_capabilities(
        &self,
        entitlement: &SubscriberEntitlement,
        now: &Timestamp,
    ) -> BTreeSet<Feature> {
        if self.is_privileged(entitlement) {
            return self.table.full();
        }
        self.table.features_for(entitlement.effective_tier(now))
    }

    /// Returns true if `feature` is unlocked. Unknown feature names are denied.
    pub fn has_access(
        &self,
        entitlement: &SubscriberEntitlement,
        feature: &str,
        now: &Timestamp,
    ) -> bool {
        match feature.parse::<Feature>() {
            Ok(feature) => self.allows(entitlement, feature, now),
            Err(_) => false,
        }
    }

    /// Returns true if `feature` is unlocked.
    pub fn allows(
        &self,
        entitlement: &SubscriberEntitlement,
        feature: Feature,
        now: &Timestamp,
    ) -> bool {
        self.is_privileged(entitlement)
            || self.table.grants(entitlement.effective_tier(now), feature)
    }

    /// Like [`allows`](Self::allows), but returns the denial with the tier
    /// that would unlock the feature.
    pub fn require_access(
        &self,
        entitlement: &SubscriberEntitlement,
        feature: Feature,
        now: &Timestamp,
    ) -> Result<(), AccessError> {
        if self.allows(entitlement, feature, now) {
            return Ok(());
        }
        Err(AccessError::FeatureLocked {
            feature: feature.as_str().to_string(),
            tier: entitlement.effective_tier(now),
            required_tier: self.table.minimum_tier_for(feature),
        })
    }
}

impl Default for EntitlementResolver {
    fn default() -> Self {
        Self::new(CapabilityTable::global())
    }
}

/// Features unlocked for `entitlement`, using the standard table.
pub fn resolve_capabilities(
    entitlement: &SubscriberEntitlement,
    now: &Timestamp,
) -> BTreeSet<Feature> {
    EntitlementResolver::default().resolve_capabilities(entitlement, now)
}

/// Returns true if `entitlement` unlocks the named feature, using the standard table.
pub fn has_access(entitlement: &SubscriberEntitlement, feature: &str, now: &Timestamp) -> bool {
    EntitlementResolver::default().has_access(entitlement, feature, now)
}

/// Fails with `FeatureLocked` unless `entitlement` unlocks `feature`.
pub fn require_access(
    entitlement: &SubscriberEntitlement,
    feature: Feature,
    now: &Timestamp,
) -> Result<(), AccessError> {
    EntitlementResolver::default().require_access(entitlement, feature, now)
}

/// Entitlement used for callers with no identity: nothing is unlocked.
pub fn anonymous_tier() -> SubscriptionTier {
    SubscriptionTier::ExpiredFree
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> Timestamp {
        Timestamp::from_unix_millis(1_700_000_000_000)
    }

    fn entitlement(tier: SubscriptionTier) -> SubscriberEntitlement {
        let mut ent = SubscriberEntitlement::new_trial(IdentityId::new("u1").unwrap(), now(), 7);
        ent.tier = tier;
        ent
    }

    #[test]
    fn expired_trial_cannot_use_doc_generator() {
        let mut ent = entitlement(SubscriptionTier::Free);
        ent.trial_ends_at = Some(now().minus_days(8));

        assert!(!has_access(&ent, "DOC_GENERATOR", &now()));
        assert_eq!(ent.tier, SubscriptionTier::Free);
    }

    #[test]
    fn active_trial_can_use_doc_generator() {
        let ent = entitlement(SubscriptionTier::Free);
        assert!(has_access(&ent, "DOC_GENERATOR", &now()));
    }

    #[test]
    fn legacy_drafts_name_resolves() {
        let ent = entitlement(SubscriptionTier::Free);
        assert!(has_access(&ent, "drafts", &now()));
    }

    #[test]
    fn unknown_feature_is_denied() {
        let ent = entitlement(SubscriptionTier::Pro);
        assert!(!has_access(&ent, "TIME_TRAVEL", &now()));
    }

    #[test]
    fn override_flag_unlocks_everything_even_when_expired() {
        let mut ent = entitlement(SubscriptionTier::ExpiredFree).with_privileged_override();
        ent.trial_ends_at = Some(now().minus_days(30));

        assert_eq!(resolve_capabilities(&ent, &now()), CapabilityTable::global().full());
    }

    #[test]
    fn configured_privileged_identity_unlocks_everything() {
        let resolver =
            EntitlementResolver::default().with_privileged([IdentityId::new("u1").unwrap()]);
        let ent = entitlement(SubscriptionTier::ExpiredFree);

        for feature in Feature::ALL {
            assert!(resolver.allows(&ent, feature, &now()));
        }
    }

    #[test]
    fn require_access_names_minimum_tier() {
        let ent = entitlement(SubscriptionTier::Basic);
        let err = require_access(&ent, Feature::ApiAccess, &now()).unwrap_err();

        assert_eq!(
            err,
            AccessError::FeatureLocked {
                feature: "API_ACCESS".to_string(),
                tier: SubscriptionTier::Basic,
                required_tier: Some(SubscriptionTier::Pro),
            }
        );
    }

    #[test]
    fn require_access_reports_effective_tier_for_lapsed_trial() {
        let mut ent = entitlement(SubscriptionTier::Free);
        ent.trial_ends_at = Some(now().minus_days(1));

        match require_access(&ent, Feature::Chat, &now()) {
            Err(AccessError::FeatureLocked { tier, .. }) => {
                assert_eq!(tier, SubscriptionTier::ExpiredFree)
            }
            other => panic!("expected FeatureLocked, got {:?}", other),
        }
    }

    #[test]
    fn anonymous_tier_unlocks_nothing() {
        assert!(CapabilityTable::global()
            .features_for(anonymous_tier())
            .is_empty());
    }

    fn any_tier() -> impl Strategy<Value = SubscriptionTier> {
        prop::sample::select(SubscriptionTier::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn has_access_is_pure(tier in any_tier(), days in -30i64..30, name in "[A-Z_]{0,16}") {
            let mut ent = entitlement(tier);
            ent.trial_ends_at = Some(now().add_days(days));
            let before = ent.clone();

            let first = has_access(&ent, &name, &now());
            let second = has_access(&ent, &name, &now());

            prop_assert_eq!(first, second);
            prop_assert_eq!(ent, before);
        }

        #[test]
        fn privileged_override_grants_every_feature(tier in any_tier()) {
            let ent = entitlement(tier).with_privileged_override();
            for feature in Feature::ALL {
                prop_assert!(has_access(&ent, feature.as_str(), &now()));
            }
        }
    }
}
