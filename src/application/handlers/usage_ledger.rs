//! UsageLedger - metered consumption per (subscription, feature).
//!
//! Increment and decrement run inside one [`StoreTransaction`]: the row is
//! locked (or created), updated and its activity appended before commit, so
//! concurrent callers never lose an update and a failure leaves nothing
//! behind.
//!
//! [`StoreTransaction`]: crate::ports::StoreTransaction

use std::sync::Arc;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{EntityRef, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::domain::usage::{Activity, Usage};
use crate::ports::{
    ActivityLog, ActorContext, Clock, FeatureRegistry, LockMode, PlanCatalog, StoreTransaction,
    SubscriptionRepository, UnitOfWork, UsageReader,
};

use super::shared::{current_subscription, ensure_active, lock_live};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Increment,
    Decrement,
}

pub struct UsageLedger {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    features: Arc<dyn FeatureRegistry>,
    usages: Arc<dyn UsageReader>,
    activities: Arc<dyn ActivityLog>,
    uow: Arc<dyn UnitOfWork>,
    clock: Arc<dyn Clock>,
    actor: Arc<dyn ActorContext>,
}

impl UsageLedger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        features: Arc<dyn FeatureRegistry>,
        usages: Arc<dyn UsageReader>,
        activities: Arc<dyn ActivityLog>,
        uow: Arc<dyn UnitOfWork>,
        clock: Arc<dyn Clock>,
        actor: Arc<dyn ActorContext>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            features,
            usages,
            activities,
            uow,
            clock,
            actor,
        }
    }

    /// Add `amount` to the subscriber's counter for `feature_slug`.
    ///
    /// The row is created on first use. A feature created after the
    /// subscription cannot be metered on it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no subscription, the feature is unknown or the
    ///   plan does not grant it
    /// - `InactiveSubscription` if the current subscription is not active
    /// - `InvalidState` if `amount` is zero, or on first use of a feature newer
    ///   than the subscription
    /// - `Precondition` if no actor is authenticated
    #[tracing::instrument(skip(self, subscriber), fields(subscriber = %subscriber))]
    pub async fn increment(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
        amount: u64,
    ) -> Result<Usage, SubscriptionError> {
        self.mutate(subscriber, feature_slug, amount, Direction::Increment)
            .await
    }

    /// Subtract `amount`, flooring the counter at zero.
    ///
    /// # Errors
    ///
    /// As [`increment`](Self::increment), plus `NotFound` if the feature has
    /// never been used on this subscription.
    #[tracing::instrument(skip(self, subscriber), fields(subscriber = %subscriber))]
    pub async fn decrement(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
        amount: u64,
    ) -> Result<Usage, SubscriptionError> {
        self.mutate(subscriber, feature_slug, amount, Direction::Decrement)
            .await
    }

    /// Units consumed so far; 0 for an unknown feature or an unused one.
    ///
    /// # Errors
    ///
    /// - `InactiveSubscription` if the feature exists and the current
    ///   subscription is not active
    pub async fn consumed(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<u64, SubscriptionError> {
        let Some(feature) = self.features.find_by_slug(feature_slug).await? else {
            return Ok(0);
        };
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        ensure_active(&subscription, self.clock.now())?;

        let used = self.usages.consumed(&subscription.id, &feature.id).await?;
        tracing::debug!(subscription_id = %subscription.id, feature = feature_slug, used, "Read consumption");
        Ok(used)
    }

    /// Soft-delete the counter rows of `feature_slug` on the current
    /// subscription. Unknown features are ignored. Returns the rows removed.
    pub async fn clean(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<u64, SubscriptionError> {
        let Some(feature) = self.features.find_by_slug(feature_slug).await? else {
            return Ok(0);
        };
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        let now = self.clock.now();
        ensure_active(&subscription, now)?;

        let mut tx = self.uow.begin().await?;
        let subscription = lock_live(&mut *tx, &subscription, LockMode::Shared).await?;
        ensure_active(&subscription, now)?;
        let removed = tx.soft_delete_usages(&subscription.id, &feature.id, now).await?;
        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            feature = feature_slug,
            removed,
            "Usage cleaned"
        );
        Ok(removed)
    }

    /// Activity trail of the subscriber's counter for `feature_slug`, oldest
    /// first. Empty when the counter does not exist.
    pub async fn activities(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
    ) -> Result<Vec<Activity>, SubscriptionError> {
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        let feature = self.find_feature(feature_slug).await?;

        match self.usages.find(&subscription.id, &feature.id).await? {
            Some(usage) => Ok(self.activities.list_for(&usage.entity_ref()).await?),
            None => Ok(Vec::new()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Mutation
    // ════════════════════════════════════════════════════════════════════════

    async fn mutate(
        &self,
        subscriber: &EntityRef,
        feature_slug: &str,
        amount: u64,
        direction: Direction,
    ) -> Result<Usage, SubscriptionError> {
        let attempted = match direction {
            Direction::Increment => "increment usage",
            Direction::Decrement => "decrement usage",
        };
        if amount == 0 {
            return Err(SubscriptionError::invalid_state(attempted, "amount must be positive"));
        }

        // 1. Preconditions, in the order callers observe them
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        let now = self.clock.now();
        ensure_active(&subscription, now)?;

        let feature = self.find_feature(feature_slug).await?;
        if !self.plans.has_feature(&subscription.plan_id, feature_slug).await? {
            return Err(SubscriptionError::feature_not_entitled(
                feature_slug,
                subscription.plan_id,
            ));
        }

        let causer = self.actor.current_actor().ok_or_else(|| {
            SubscriptionError::precondition(format!("an authenticated actor is required to {}", attempted))
        })?;

        // 2. Locked read-modify-write with its audit entry. A plan change may
        // have replaced the subscription since it was read above.
        let mut tx = self.uow.begin().await?;
        let subscription = lock_live(&mut *tx, &subscription, LockMode::Shared).await?;
        ensure_active(&subscription, now)?;
        let mut usage = match direction {
            Direction::Increment => {
                self.lock_or_create(&mut *tx, &subscription, &feature, now)
                    .await?
            }
            Direction::Decrement => tx
                .lock_usage(&subscription.id, &feature.id)
                .await?
                .ok_or_else(|| SubscriptionError::not_found("usage", feature_slug))?,
        };

        let (change, activity) = match direction {
            Direction::Increment => {
                let change = usage.increment(amount, now);
                let activity =
                    Activity::incremented(amount, &feature.name, change, usage.entity_ref(), causer, now);
                (change, activity)
            }
            Direction::Decrement => {
                let change = usage.decrement(amount, now);
                let activity =
                    Activity::decremented(amount, &feature.name, change, usage.entity_ref(), causer, now);
                (change, activity)
            }
        };

        tx.update_usage(&usage).await?;
        tx.append_activity(&activity).await?;
        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            feature = feature_slug,
            before = change.before,
            after = change.after,
            "Usage updated"
        );
        Ok(usage)
    }

    async fn lock_or_create(
        &self,
        tx: &mut dyn StoreTransaction,
        subscription: &Subscription,
        feature: &Feature,
        now: Timestamp,
    ) -> Result<Usage, SubscriptionError> {
        if let Some(usage) = tx.lock_usage(&subscription.id, &feature.id).await? {
            return Ok(usage);
        }

        if feature.created_at > subscription.created_at {
            return Err(SubscriptionError::invalid_state(
                "increment usage",
                format!(
                    "feature '{}' was created after subscription {}",
                    feature.slug, subscription.id
                ),
            ));
        }

        let usage = Usage::new(subscription.id, feature.id, now);
        match tx.insert_usage(&usage).await {
            Ok(()) => Ok(usage),
            // Another caller created the row first; take its lock instead.
            Err(e) if e.is_unique_violation() => tx
                .lock_usage(&subscription.id, &feature.id)
                .await?
                .ok_or_else(|| SubscriptionError::infrastructure(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_feature(&self, slug: &str) -> Result<Feature, SubscriptionError> {
        self.features
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("feature", slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedActor, FixedClock, InMemoryStore};
    use crate::domain::catalog::{EntitlementValue, Plan, PlanCadence};
    use crate::domain::subscription::ErrorKind;
    use crate::domain::foundation::{DomainError, SubscriptionId};
    use crate::domain::usage::ActivityChanges;
    use async_trait::async_trait;

    /// Answers `latest_for` with a copy read before a concurrent plan change
    /// deleted it.
    struct StaleSubscriptions {
        stale: Subscription,
        store: InMemoryStore,
    }

    #[async_trait]
    impl SubscriptionRepository for StaleSubscriptions {
        async fn latest_for(&self, _: &EntityRef) -> Result<Option<Subscription>, DomainError> {
            Ok(Some(self.stale.clone()))
        }

        async fn latest_active_for(
            &self,
            _: &EntityRef,
            _: Timestamp,
        ) -> Result<Option<Subscription>, DomainError> {
            Ok(Some(self.stale.clone()))
        }

        async fn list_for(&self, _: &EntityRef) -> Result<Vec<Subscription>, DomainError> {
            Ok(vec![self.stale.clone()])
        }

        async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
            SubscriptionRepository::find_by_id(&self.store, id).await
        }

        async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
            SubscriptionRepository::save(&self.store, subscription).await
        }

        async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
            SubscriptionRepository::update(&self.store, subscription).await
        }

        async fn delete(&self, id: &SubscriptionId, now: Timestamp) -> Result<(), DomainError> {
            SubscriptionRepository::delete(&self.store, id, now).await
        }
    }

    struct Fixture {
        store: InMemoryStore,
        clock: Arc<FixedClock>,
        subscription: Subscription,
    }

    fn account() -> EntityRef {
        EntityRef::new("Account", "1").unwrap()
    }

    fn user() -> EntityRef {
        EntityRef::new("User", "42").unwrap()
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let t = Timestamp::from_unix_secs(1_700_000_000);
        let clock = Arc::new(FixedClock::new(t));

        let plan = Plan::with_cadence("Basic", "basic", 1_000, PlanCadence::Monthly, t).unwrap();
        PlanCatalog::save(&store, &plan).await.unwrap();

        let users = Feature::new("Users", "users", 1, t.plus_secs(-1)).unwrap();
        FeatureRegistry::save(&store, &users).await.unwrap();
        store
            .attach_feature(&plan.id, &users.id, EntitlementValue::new("10"))
            .await
            .unwrap();

        let reports = Feature::new("Reports", "reports", 2, t.plus_secs(-1)).unwrap();
        FeatureRegistry::save(&store, &reports).await.unwrap();

        let subscription = Subscription::new(account(), &plan, t, t);
        SubscriptionRepository::save(&store, &subscription).await.unwrap();

        Fixture {
            store,
            clock,
            subscription,
        }
    }

    fn ledger(f: &Fixture, actor: FixedActor) -> UsageLedger {
        let store = Arc::new(f.store.clone());
        UsageLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            f.clock.clone(),
            Arc::new(actor),
        )
    }

    fn stale_ledger(f: &Fixture) -> UsageLedger {
        let store = Arc::new(f.store.clone());
        UsageLedger::new(
            Arc::new(StaleSubscriptions {
                stale: f.subscription.clone(),
                store: f.store.clone(),
            }),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            f.clock.clone(),
            Arc::new(FixedActor::authenticated(user())),
        )
    }

    async fn delete_behind_ledger(f: &Fixture) {
        let mut tx = f.store.begin().await.unwrap();
        tx.soft_delete_subscription(&f.subscription.id, f.clock.now())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn first_increment_creates_row_and_activity() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));

        let usage = ledger.increment(&account(), "users", 1).await.unwrap();

        assert_eq!(usage.used, 1);
        let trail = ledger.activities(&account(), "users").await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].description, "incremented 1 Users");
        assert_eq!(trail[0].changes, Some(ActivityChanges { before: 0, after: 1 }));
        assert_eq!(trail[0].causer, user());
    }

    #[tokio::test]
    async fn zero_amount_is_invalid() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));

        let err = ledger.increment(&account(), "users", 0).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn missing_actor_is_precondition_and_writes_nothing() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::anonymous());

        let err = ledger.increment(&account(), "users", 1).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(f.store.all_usages().await.is_empty());
        assert_eq!(f.store.activity_count().await, 0);
    }

    #[tokio::test]
    async fn unentitled_feature_is_not_found() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));

        let err = ledger.increment(&account(), "reports", 1).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::FeatureNotEntitled { .. }));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unknown_feature_is_not_found() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));

        let err = ledger.increment(&account(), "storage", 1).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::NotFound { entity: "feature", .. }));
    }

    #[tokio::test]
    async fn decrement_without_row_is_not_found() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));

        let err = ledger.decrement(&account(), "users", 1).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::NotFound { entity: "usage", .. }));
    }

    #[tokio::test]
    async fn inactive_subscription_blocks_mutation() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));
        let mut canceled = f.subscription.clone();
        canceled.cancel(f.clock.now());
        f.store.update(&canceled).await.unwrap();

        let err = ledger.increment(&account(), "users", 1).await.unwrap_err();

        assert_eq!(err, SubscriptionError::InactiveSubscription(f.subscription.id));
    }

    #[tokio::test]
    async fn consumed_of_unknown_feature_is_zero_even_without_subscription() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::anonymous());
        let stranger = EntityRef::new("Account", "999").unwrap();

        assert_eq!(ledger.consumed(&stranger, "storage").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clean_removes_counter() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));
        ledger.increment(&account(), "users", 4).await.unwrap();

        assert_eq!(ledger.clean(&account(), "users").await.unwrap(), 1);
        assert_eq!(ledger.consumed(&account(), "users").await.unwrap(), 0);
        assert_eq!(ledger.clean(&account(), "storage").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clean_then_increment_starts_fresh_row() {
        let f = fixture().await;
        let ledger = ledger(&f, FixedActor::authenticated(user()));
        ledger.increment(&account(), "users", 4).await.unwrap();
        ledger.clean(&account(), "users").await.unwrap();

        let usage = ledger.increment(&account(), "users", 1).await.unwrap();

        assert_eq!(usage.used, 1);
        assert_eq!(f.store.all_usages().await.len(), 2);
    }

    #[tokio::test]
    async fn increment_rejects_subscription_deleted_after_lookup() {
        let f = fixture().await;
        let ledger = stale_ledger(&f);
        delete_behind_ledger(&f).await;

        let err = ledger.increment(&account(), "users", 1).await.unwrap_err();

        assert!(matches!(err, SubscriptionError::NotFound { entity: "subscription", .. }));
        assert!(f.store.all_usages().await.is_empty());
        assert_eq!(f.store.activity_count().await, 0);
    }

    #[tokio::test]
    async fn clean_rejects_subscription_deleted_after_lookup() {
        let f = fixture().await;
        ledger(&f, FixedActor::authenticated(user()))
            .increment(&account(), "users", 2)
            .await
            .unwrap();
        let ledger = stale_ledger(&f);
        delete_behind_ledger(&f).await;

        let err = ledger.clean(&account(), "users").await.unwrap_err();

        assert!(err.is_not_found());
    }
}
