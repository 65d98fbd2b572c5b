//! Row storage shared by the in-memory store and its transactions.

use std::collections::HashMap;

use crate::domain::catalog::{EntitlementValue, Feature, Plan};
use crate::domain::foundation::{
    DomainError, ErrorCode, FeatureId, PlanId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};

/// Every table of the store. Cloned wholesale to give a transaction its
/// private working copy.
#[derive(Debug, Clone, Default)]
pub(super) struct Tables {
    pub plans: HashMap<PlanId, Plan>,
    pub features: HashMap<FeatureId, Feature>,
    pub plan_features: HashMap<(PlanId, FeatureId), EntitlementValue>,
    /// Insertion order breaks `created_at` ties.
    pub subscriptions: Vec<Subscription>,
    pub usages: Vec<Usage>,
    pub activities: Vec<Activity>,
}

impl Tables {
    pub fn live_usage(&self, subscription_id: &SubscriptionId, feature_id: &FeatureId) -> Option<&Usage> {
        self.usages.iter().find(|u| {
            !u.is_deleted() && u.subscription_id == *subscription_id && u.feature_id == *feature_id
        })
    }

    pub fn insert_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        if self.live_usage(&usage.subscription_id, &usage.feature_id).is_some() {
            return Err(DomainError::unique_violation("usages_feature_id_subscription_id_key"));
        }
        self.usages.push(usage.clone());
        Ok(())
    }

    pub fn update_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        let row = self
            .usages
            .iter_mut()
            .find(|u| u.id == usage.id)
            .ok_or_else(|| DomainError::new(ErrorCode::NotFound, format!("usage {} not found", usage.id)))?;
        *row = usage.clone();
        Ok(())
    }

    pub fn soft_delete_usages_where<F>(&mut self, now: Timestamp, predicate: F) -> u64
    where
        F: Fn(&Usage) -> bool,
    {
        let mut affected = 0;
        for usage in self.usages.iter_mut().filter(|u| !u.is_deleted()) {
            if predicate(usage) {
                usage.soft_delete(now);
                affected += 1;
            }
        }
        affected
    }

    pub fn live_subscription_mut(&mut self, id: &SubscriptionId) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.id == *id && !s.is_deleted())
    }

    pub fn soft_delete_subscription(&mut self, id: &SubscriptionId, now: Timestamp) -> Result<(), DomainError> {
        let subscription = self.live_subscription_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::NotFound, format!("subscription {} not found", id))
        })?;
        subscription.soft_delete(now);
        self.soft_delete_usages_where(now, |u| u.subscription_id == *id);
        Ok(())
    }
}
