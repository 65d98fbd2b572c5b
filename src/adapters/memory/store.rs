//! In-memory implementation of every storage port.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::catalog::{EntitlementValue, Feature, Plan, PlanCadence, PlanFeature};
use crate::domain::foundation::{
    DomainError, EntityRef, ErrorCode, FeatureId, PlanId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};
use crate::ports::{
    ActivityLog, FeatureRegistry, PlanCatalog, StoreTransaction, SubscriptionRepository,
    UnitOfWork, UsageReader,
};

use super::tables::Tables;
use super::transaction::InMemoryTransaction;

/// Store keeping every table behind one async mutex.
///
/// Transactions hold that mutex until they end, so ledger mutations are
/// serialized store-wide. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_usage_inserts: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Make every transactional usage insert fail with a unique violation.
    pub fn fail_usage_inserts(&self, fail: bool) {
        self.fail_usage_inserts.store(fail, Ordering::SeqCst);
    }

    /// Every subscription row, tombstoned ones included.
    pub async fn all_subscriptions(&self) -> Vec<Subscription> {
        self.tables.lock().await.subscriptions.clone()
    }

    /// Every usage row, tombstoned ones included.
    pub async fn all_usages(&self) -> Vec<Usage> {
        self.tables.lock().await.usages.clone()
    }

    pub async fn activity_count(&self) -> usize {
        self.tables.lock().await.activities.len()
    }
}

fn not_found(entity: &str, key: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::NotFound, format!("{} {} not found", entity, key))
}

fn live_features_ordered(tables: &Tables, plan_id: &PlanId) -> Vec<PlanFeature> {
    let mut features: Vec<PlanFeature> = tables
        .plan_features
        .iter()
        .filter(|((pid, _), _)| pid == plan_id)
        .filter_map(|((_, fid), value)| {
            tables
                .features
                .get(fid)
                .filter(|f| !f.is_deleted())
                .map(|f| PlanFeature::new(f.clone(), value.clone()))
        })
        .collect();
    features.sort_by(|a, b| {
        (a.feature.sort_order, &a.feature.name).cmp(&(b.feature.sort_order, &b.feature.name))
    });
    features
}

// ============================================================
// Catalog
// ============================================================

#[async_trait]
impl PlanCatalog for InMemoryStore {
    async fn find(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables.plans.get(id).filter(|p| !p.is_deleted()).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Plan>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .plans
            .values()
            .find(|p| !p.is_deleted() && p.slug == slug)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Plan>, DomainError> {
        let tables = self.tables.lock().await;
        let mut plans: Vec<Plan> = tables.plans.values().filter(|p| !p.is_deleted()).cloned().collect();
        plans.sort_by(|a, b| (a.sort_order, &a.name).cmp(&(b.sort_order, &b.name)));
        Ok(plans)
    }

    async fn find_by_cadence(&self, cadence: PlanCadence) -> Result<Vec<Plan>, DomainError> {
        Ok(PlanCatalog::list(self)
            .await?
            .into_iter()
            .filter(|p| cadence.matches(p))
            .collect())
    }

    async fn features_of(&self, plan_id: &PlanId) -> Result<Vec<PlanFeature>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(live_features_ordered(&tables, plan_id))
    }

    async fn entitlement(
        &self,
        plan_id: &PlanId,
        feature_slug: &str,
    ) -> Result<Option<PlanFeature>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(live_features_ordered(&tables, plan_id)
            .into_iter()
            .find(|pf| pf.feature.slug == feature_slug))
    }

    async fn save(&self, plan: &Plan) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        if tables
            .plans
            .values()
            .any(|p| p.id != plan.id && !p.is_deleted() && p.slug == plan.slug)
        {
            return Err(DomainError::unique_violation("plans_slug_key"));
        }
        tables.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn attach_feature(
        &self,
        plan_id: &PlanId,
        feature_id: &FeatureId,
        value: EntitlementValue,
    ) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        if !tables.plans.get(plan_id).map_or(false, |p| !p.is_deleted()) {
            return Err(not_found("plan", plan_id));
        }
        if !tables.features.get(feature_id).map_or(false, |f| !f.is_deleted()) {
            return Err(not_found("feature", feature_id));
        }
        tables.plan_features.insert((*plan_id, *feature_id), value);
        Ok(())
    }

    async fn detach_feature(&self, plan_id: &PlanId, feature_id: &FeatureId) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        tables.plan_features.remove(&(*plan_id, *feature_id));
        Ok(())
    }

    async fn delete(&self, plan_id: &PlanId, now: Timestamp) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        let plan = tables
            .plans
            .get_mut(plan_id)
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| not_found("plan", plan_id))?;
        plan.deleted_at = Some(now);
        plan.updated_at = now;
        tables.plan_features.retain(|(pid, _), _| pid != plan_id);
        Ok(())
    }
}

#[async_trait]
impl FeatureRegistry for InMemoryStore {
    async fn find_by_id(&self, id: &FeatureId) -> Result<Option<Feature>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables.features.get(id).filter(|f| !f.is_deleted()).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Feature>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .features
            .values()
            .find(|f| !f.is_deleted() && f.slug == slug)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Feature>, DomainError> {
        let tables = self.tables.lock().await;
        let mut features: Vec<Feature> = tables
            .features
            .values()
            .filter(|f| !f.is_deleted())
            .cloned()
            .collect();
        features.sort_by(|a, b| (a.sort_order, &a.name).cmp(&(b.sort_order, &b.name)));
        Ok(features)
    }

    async fn save(&self, feature: &Feature) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        if tables
            .features
            .values()
            .any(|f| f.id != feature.id && !f.is_deleted() && f.slug == feature.slug)
        {
            return Err(DomainError::unique_violation("features_slug_key"));
        }
        tables.features.insert(feature.id, feature.clone());
        Ok(())
    }

    async fn delete(&self, id: &FeatureId, now: Timestamp) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        let feature = tables
            .features
            .get_mut(id)
            .filter(|f| !f.is_deleted())
            .ok_or_else(|| not_found("feature", id))?;
        feature.deleted_at = Some(now);
        feature.updated_at = now;
        tables.plan_features.retain(|(_, fid), _| fid != id);
        tables.soft_delete_usages_where(now, |u| u.feature_id == *id);
        Ok(())
    }
}

// ============================================================
// Subscriptions
// ============================================================

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn latest_for(&self, subscriber: &EntityRef) -> Result<Option<Subscription>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_deleted() && s.subscriber == *subscriber)
            .max_by_key(|(idx, s)| (s.created_at, *idx))
            .map(|(_, s)| s.clone()))
    }

    async fn latest_active_for(
        &self,
        subscriber: &EntityRef,
        now: Timestamp,
    ) -> Result<Option<Subscription>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_deleted() && s.subscriber == *subscriber && s.is_active(now))
            .max_by_key(|(idx, s)| (s.created_at, *idx))
            .map(|(_, s)| s.clone()))
    }

    async fn list_for(&self, subscriber: &EntityRef) -> Result<Vec<Subscription>, DomainError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<(usize, Subscription)> = tables
            .subscriptions
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_deleted() && s.subscriber == *subscriber)
            .map(|(idx, s)| (idx, s.clone()))
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| (b.created_at, ib).cmp(&(a.created_at, ia)));
        Ok(rows.into_iter().map(|(_, s)| s).collect())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.id == *id && !s.is_deleted())
            .cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        if tables.subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(DomainError::unique_violation("subscriptions_pkey"));
        }
        tables.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        let row = tables
            .live_subscription_mut(&subscription.id)
            .ok_or_else(|| not_found("subscription", subscription.id))?;
        *row = subscription.clone();
        Ok(())
    }

    async fn delete(&self, id: &SubscriptionId, now: Timestamp) -> Result<(), DomainError> {
        self.tables.lock().await.soft_delete_subscription(id, now)
    }
}

// ============================================================
// Ledger
// ============================================================

#[async_trait]
impl UsageReader for InMemoryStore {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables.live_usage(subscription_id, feature_id).cloned())
    }

    async fn consumed(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<u64, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .usages
            .iter()
            .filter(|u| {
                !u.is_deleted() && u.subscription_id == *subscription_id && u.feature_id == *feature_id
            })
            .map(|u| u.used)
            .sum())
    }

    async fn list_for(&self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .usages
            .iter()
            .filter(|u| !u.is_deleted() && u.subscription_id == *subscription_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActivityLog for InMemoryStore {
    async fn append(&self, activity: &Activity) -> Result<(), DomainError> {
        self.tables.lock().await.activities.push(activity.clone());
        Ok(())
    }

    async fn list_for(&self, subject: &EntityRef) -> Result<Vec<Activity>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .activities
            .iter()
            .filter(|a| a.subject == *subject)
            .cloned()
            .collect())
    }

    async fn purge_for(&self, subject: &EntityRef) -> Result<u64, DomainError> {
        let mut tables = self.tables.lock().await;
        let before = tables.activities.len();
        tables.activities.retain(|a| a.subject != *subject);
        Ok((before - tables.activities.len()) as u64)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(InMemoryTransaction::new(
            guard,
            Arc::clone(&self.fail_usage_inserts),
        )))
    }
}
