//! Transactions over the in-memory store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::domain::foundation::{DomainError, FeatureId, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};
use crate::ports::{LockMode, StoreTransaction};

use super::tables::Tables;

/// Holds the store-wide lock for its whole lifetime and writes to a private
/// copy of the tables. `commit` swaps the copy in; anything else discards it.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_usage_inserts: Arc<AtomicBool>,
}

impl InMemoryTransaction {
    pub(super) fn new(guard: OwnedMutexGuard<Tables>, fail_usage_inserts: Arc<AtomicBool>) -> Self {
        let working = guard.clone();
        Self {
            guard,
            working,
            fail_usage_inserts,
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    // The store-wide guard already excludes every other transaction.
    async fn lock_subscription(
        &mut self,
        id: &SubscriptionId,
        _mode: LockMode,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .find(|s| s.id == *id && !s.is_deleted())
            .cloned())
    }

    async fn lock_usage(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError> {
        Ok(self.working.live_usage(subscription_id, feature_id).cloned())
    }

    async fn insert_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        if self.fail_usage_inserts.load(Ordering::SeqCst) {
            return Err(DomainError::unique_violation("usages_feature_id_subscription_id_key"));
        }
        self.working.insert_usage(usage)
    }

    async fn update_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        self.working.update_usage(usage)
    }

    async fn usages_of(&mut self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError> {
        Ok(self
            .working
            .usages
            .iter()
            .filter(|u| !u.is_deleted() && u.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }

    async fn soft_delete_usages(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        Ok(self.working.soft_delete_usages_where(now, |u| {
            u.subscription_id == *subscription_id && u.feature_id == *feature_id
        }))
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), DomainError> {
        self.working.activities.push(activity.clone());
        Ok(())
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        if self.working.subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(DomainError::unique_violation("subscriptions_pkey"));
        }
        self.working.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn soft_delete_subscription(
        &mut self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.working.soft_delete_subscription(id, now)
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction").finish_non_exhaustive()
    }
}
