//! EntitlementEvaluator - answers "may this subscriber use this feature?".
//!
//! Values come from the live plan of the subscriber's current subscription.
//! Reads run outside any transaction and may trail in-flight ledger writes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::EntitlementConfig;
use crate::domain::catalog::{EntitlementValue, PlanFeature};
use crate::domain::foundation::EntityRef;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{FeatureRegistry, PlanCatalog, SubscriptionRepository};

use super::shared::current_subscription;
use super::usage_ledger::UsageLedger;

pub struct EntitlementEvaluator {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    features: Arc<dyn FeatureRegistry>,
    ledger: Arc<UsageLedger>,
    positive_tokens: HashSet<String>,
    default_value: EntitlementValue,
}

impl EntitlementEvaluator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        features: Arc<dyn FeatureRegistry>,
        ledger: Arc<UsageLedger>,
        config: &EntitlementConfig,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            features,
            ledger,
            positive_tokens: config.normalized_tokens(),
            default_value: EntitlementValue::new(config.default_value.clone()),
        }
    }

    /// The plan's value for the feature, or the configured default when the
    /// plan does not include it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the subscriber has no subscription
    pub async fn feature_value(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<EntitlementValue, SubscriptionError> {
        Ok(self
            .entitlement(subscriber, feature_slug)
            .await?
            .map(|pf| pf.value)
            .unwrap_or_else(|| self.default_value.clone()))
    }

    /// True when the plan includes the feature with a positive token.
    pub async fn feature_enabled(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<bool, SubscriptionError> {
        Ok(self
            .entitlement(subscriber, feature_slug)
            .await?
            .map_or(false, |pf| pf.value.is_positive(&self.positive_tokens)))
    }

    /// Quota left: the numeric plan value minus consumption.
    ///
    /// Non-numeric values count as a quota of 0, so the result is only
    /// meaningful for quota-style features. Check
    /// [`feature_enabled`](Self::feature_enabled) for token-style ones.
    pub async fn remaining_use(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<i64, SubscriptionError> {
        let quota = self.feature_value(subscriber, feature_slug).await?.as_quota();
        let consumed = self.ledger.consumed(subscriber, feature_slug).await?;
        Ok(quota.saturating_sub(i64::try_from(consumed).unwrap_or(i64::MAX)))
    }

    /// Whether one more unit may be used now.
    ///
    /// Unknown features and features missing from the plan are never usable.
    /// Enabled features always are. A value of exactly `"0"` never is.
    /// Otherwise some quota must remain.
    pub async fn can_use(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<bool, SubscriptionError> {
        if self.features.find_by_slug(feature_slug).await?.is_none() {
            return Ok(false);
        }

        // The configured default never grants use of a feature the plan lacks.
        let Some(entitlement) = self.entitlement(subscriber, feature_slug).await? else {
            return Ok(false);
        };
        let value = entitlement.value;
        if value.is_positive(&self.positive_tokens) {
            return Ok(true);
        }
        if value.is_zero() {
            return Ok(false);
        }

        let remaining = self.remaining_use(subscriber, feature_slug).await?;
        tracing::debug!(feature = feature_slug, remaining, "Evaluated quota");
        Ok(remaining > 0)
    }

    async fn entitlement(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<Option<PlanFeature>, SubscriptionError> {
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        Ok(self.plans.entitlement(&subscription.plan_id, feature_slug).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedActor, FixedClock, InMemoryStore};
    use crate::domain::catalog::{Feature, Plan, PlanCadence};
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::Subscription;

    fn account() -> EntityRef {
        EntityRef::new("Account", "1").unwrap()
    }

    async fn evaluator(config: EntitlementConfig) -> (EntitlementEvaluator, Arc<UsageLedger>) {
        let store = Arc::new(InMemoryStore::new());
        let t = Timestamp::from_unix_secs(1_700_000_000);
        let clock = Arc::new(FixedClock::new(t));

        let plan = Plan::with_cadence("Team", "team", 2_000, PlanCadence::Monthly, t).unwrap();
        PlanCatalog::save(store.as_ref(), &plan).await.unwrap();
        for (slug, value) in [("sso", "ok"), ("users", "3"), ("exports", "0"), ("support", "email")] {
            let feature = Feature::new(slug.to_uppercase(), slug, 0, t.plus_secs(-1)).unwrap();
            FeatureRegistry::save(store.as_ref(), &feature).await.unwrap();
            store
                .attach_feature(&plan.id, &feature.id, EntitlementValue::new(value))
                .await
                .unwrap();
        }
        let audit = Feature::new("Audit", "audit", 0, t.plus_secs(-1)).unwrap();
        FeatureRegistry::save(store.as_ref(), &audit).await.unwrap();

        SubscriptionRepository::save(store.as_ref(), &Subscription::new(account(), &plan, t, t))
            .await
            .unwrap();

        let ledger = Arc::new(UsageLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            clock,
            Arc::new(FixedActor::authenticated(EntityRef::new("User", "7").unwrap())),
        ));
        let evaluator = EntitlementEvaluator::new(
            store.clone(),
            store.clone(),
            store,
            ledger.clone(),
            &config,
        );
        (evaluator, ledger)
    }

    #[tokio::test]
    async fn value_falls_back_to_default() {
        let (evaluator, _) = evaluator(EntitlementConfig::default()).await;

        assert_eq!(evaluator.feature_value(&account(), "users").await.unwrap().as_str(), "3");
        assert_eq!(evaluator.feature_value(&account(), "audit").await.unwrap().as_str(), "0");
    }

    #[tokio::test]
    async fn default_value_is_configurable() {
        let config = EntitlementConfig {
            default_value: "none".to_string(),
            ..Default::default()
        };
        let (evaluator, _) = evaluator(config).await;

        assert_eq!(evaluator.feature_value(&account(), "audit").await.unwrap().as_str(), "none");
    }

    #[tokio::test]
    async fn enabled_matches_tokens_case_insensitively() {
        let (evaluator, _) = evaluator(EntitlementConfig::default()).await;

        assert!(evaluator.feature_enabled(&account(), "sso").await.unwrap());
        assert!(!evaluator.feature_enabled(&account(), "users").await.unwrap());
        assert!(!evaluator.feature_enabled(&account(), "audit").await.unwrap());
    }

    #[tokio::test]
    async fn remaining_subtracts_consumption() {
        let (evaluator, ledger) = evaluator(EntitlementConfig::default()).await;
        ledger.increment(&account(), "users", 2).await.unwrap();

        assert_eq!(evaluator.remaining_use(&account(), "users").await.unwrap(), 1);
        assert_eq!(evaluator.remaining_use(&account(), "support").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn can_use_truth_table() {
        let (evaluator, ledger) = evaluator(EntitlementConfig::default()).await;

        assert!(!evaluator.can_use(&account(), "storage").await.unwrap());
        assert!(!evaluator.can_use(&account(), "audit").await.unwrap());
        assert!(evaluator.can_use(&account(), "sso").await.unwrap());
        assert!(!evaluator.can_use(&account(), "exports").await.unwrap());
        assert!(!evaluator.can_use(&account(), "support").await.unwrap());

        ledger.increment(&account(), "users", 2).await.unwrap();
        assert!(evaluator.can_use(&account(), "users").await.unwrap());
        ledger.increment(&account(), "users", 1).await.unwrap();
        assert!(!evaluator.can_use(&account(), "users").await.unwrap());
    }

    #[tokio::test]
    async fn nonzero_default_does_not_grant_missing_feature() {
        let config = EntitlementConfig {
            default_value: "5".to_string(),
            ..Default::default()
        };
        let (evaluator, _) = evaluator(config).await;

        assert_eq!(evaluator.feature_value(&account(), "audit").await.unwrap().as_str(), "5");
        assert!(!evaluator.can_use(&account(), "audit").await.unwrap());
    }
}
