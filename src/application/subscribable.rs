//! Subscribable - the per-subscriber facade over the pricing handlers.
//!
//! Host entities implement [`Subscribable`] by naming themselves and the
//! [`PricingEngine`] they live in; every operation then comes for free.
//! [`SubscriberHandle`] is the ready-made implementation for hosts that
//! only hold an [`EntityRef`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::registry::EntityRegistry;
use crate::config::EntitlementConfig;
use crate::domain::catalog::{EntitlementValue, Plan};
use crate::domain::foundation::{EntityRef, PlanId};
use crate::domain::subscription::{ChangePlanOptions, Subscription, SubscriptionError};
use crate::domain::usage::Usage;
use crate::ports::{
    ActivityLog, ActorContext, Clock, EventPublisher, FeatureRegistry, PlanCatalog,
    SubscriptionRepository, UnitOfWork, UsageReader,
};

use super::handlers::{
    ChangePlanCommand, ChangePlanHandler, EntitlementEvaluator, SubscriptionLifecycle, UsageLedger,
};

/// A backend that serves every storage port.
///
/// Blanket-implemented, so `InMemoryStore` and `PostgresStore` qualify as-is.
pub trait PricingStore:
    PlanCatalog + FeatureRegistry + SubscriptionRepository + UsageReader + ActivityLog + UnitOfWork
{
}

impl<T> PricingStore for T where
    T: PlanCatalog
        + FeatureRegistry
        + SubscriptionRepository
        + UsageReader
        + ActivityLog
        + UnitOfWork
{
}

/// The handlers wired over one store.
pub struct PricingEngine {
    lifecycle: SubscriptionLifecycle,
    change_plan: ChangePlanHandler,
    ledger: Arc<UsageLedger>,
    evaluator: EntitlementEvaluator,
}

impl PricingEngine {
    pub fn new<S: PricingStore + 'static>(
        store: Arc<S>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        actor: Arc<dyn ActorContext>,
        config: &EntitlementConfig,
    ) -> Self {
        let subscriptions: Arc<dyn SubscriptionRepository> = store.clone();
        let plans: Arc<dyn PlanCatalog> = store.clone();
        let features: Arc<dyn FeatureRegistry> = store.clone();
        let uow: Arc<dyn UnitOfWork> = store.clone();

        let ledger = Arc::new(UsageLedger::new(
            subscriptions.clone(),
            plans.clone(),
            features.clone(),
            store.clone(),
            store,
            uow.clone(),
            clock.clone(),
            actor,
        ));

        Self {
            lifecycle: SubscriptionLifecycle::new(
                subscriptions.clone(),
                plans.clone(),
                publisher.clone(),
                clock.clone(),
            ),
            change_plan: ChangePlanHandler::new(
                subscriptions.clone(),
                plans.clone(),
                uow,
                publisher,
                clock,
            ),
            evaluator: EntitlementEvaluator::new(
                subscriptions,
                plans,
                features,
                ledger.clone(),
                config,
            ),
            ledger,
        }
    }

    /// Reject subscribers the registry cannot resolve.
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.lifecycle = self.lifecycle.with_registry(registry);
        self
    }

    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    pub fn change_plan_handler(&self) -> &ChangePlanHandler {
        &self.change_plan
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn evaluator(&self) -> &EntitlementEvaluator {
        &self.evaluator
    }
}

/// Pricing operations addressed to one subscriber.
#[async_trait]
pub trait Subscribable: Send + Sync {
    fn subscriber(&self) -> &EntityRef;

    fn engine(&self) -> &PricingEngine;

    /// Live subscriptions, newest first.
    async fn subscriptions(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        self.engine().lifecycle().subscriptions_of(self.subscriber()).await
    }

    async fn current_subscription(&self) -> Result<Subscription, SubscriptionError> {
        self.engine().lifecycle().current_subscription(self.subscriber()).await
    }

    async fn current_plan(&self) -> Result<Plan, SubscriptionError> {
        self.engine().lifecycle().current_plan(self.subscriber()).await
    }

    async fn subscribe(&self, plan_id: &PlanId) -> Result<Subscription, SubscriptionError> {
        self.engine().lifecycle().subscribe(self.subscriber(), plan_id).await
    }

    async fn unsubscribe(&self) -> Result<Subscription, SubscriptionError> {
        self.engine().lifecycle().unsubscribe(self.subscriber()).await
    }

    /// Move to `plan_id`, carrying usage over. Returns the new subscription.
    async fn change_plan(
        &self,
        plan_id: &PlanId,
        options: ChangePlanOptions,
    ) -> Result<Subscription, SubscriptionError> {
        let cmd = ChangePlanCommand {
            subscriber: self.subscriber().clone(),
            plan_id: *plan_id,
            options,
        };
        Ok(self.engine().change_plan_handler().handle(cmd).await?.subscription)
    }

    async fn feature_enabled(&self, feature_slug: &str) -> Result<bool, SubscriptionError> {
        self.engine()
            .evaluator()
            .feature_enabled(self.subscriber(), feature_slug)
            .await
    }

    async fn feature_value(&self, feature_slug: &str) -> Result<EntitlementValue, SubscriptionError> {
        self.engine()
            .evaluator()
            .feature_value(self.subscriber(), feature_slug)
            .await
    }

    async fn increment_use(&self, feature_slug: &str, amount: u64) -> Result<Usage, SubscriptionError> {
        self.engine()
            .ledger()
            .increment(self.subscriber(), feature_slug, amount)
            .await
    }

    async fn decrement_use(&self, feature_slug: &str, amount: u64) -> Result<Usage, SubscriptionError> {
        self.engine()
            .ledger()
            .decrement(self.subscriber(), feature_slug, amount)
            .await
    }

    async fn consumed_use(&self, feature_slug: &str) -> Result<u64, SubscriptionError> {
        self.engine().ledger().consumed(self.subscriber(), feature_slug).await
    }

    async fn remaining_use(&self, feature_slug: &str) -> Result<i64, SubscriptionError> {
        self.engine()
            .evaluator()
            .remaining_use(self.subscriber(), feature_slug)
            .await
    }

    async fn can_use(&self, feature_slug: &str) -> Result<bool, SubscriptionError> {
        self.engine().evaluator().can_use(self.subscriber(), feature_slug).await
    }

    async fn clean_use(&self, feature_slug: &str) -> Result<u64, SubscriptionError> {
        self.engine().ledger().clean(self.subscriber(), feature_slug).await
    }
}

/// A subscriber identity bound to an engine.
#[derive(Clone)]
pub struct SubscriberHandle {
    subscriber: EntityRef,
    engine: Arc<PricingEngine>,
}

impl SubscriberHandle {
    pub fn new(subscriber: EntityRef, engine: Arc<PricingEngine>) -> Self {
        Self { subscriber, engine }
    }
}

impl Subscribable for SubscriberHandle {
    fn subscriber(&self) -> &EntityRef {
        &self.subscriber
    }

    fn engine(&self) -> &PricingEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedActor, FixedClock, InMemoryEventBus, InMemoryStore};
    use crate::domain::catalog::{Feature, PlanCadence};
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn handle_routes_through_engine() {
        let store = Arc::new(InMemoryStore::new());
        let t = Timestamp::from_unix_secs(1_700_000_000);

        let plan = Plan::with_cadence("Starter", "starter", 900, PlanCadence::Monthly, t).unwrap();
        PlanCatalog::save(store.as_ref(), &plan).await.unwrap();
        let seats = Feature::new("Seats", "seats", 0, t.plus_secs(-60)).unwrap();
        FeatureRegistry::save(store.as_ref(), &seats).await.unwrap();
        store
            .attach_feature(&plan.id, &seats.id, EntitlementValue::new("2"))
            .await
            .unwrap();

        let engine = Arc::new(PricingEngine::new(
            store,
            Arc::new(InMemoryEventBus::new()),
            Arc::new(FixedClock::new(t)),
            Arc::new(FixedActor::authenticated(EntityRef::new("User", "1").unwrap())),
            &EntitlementConfig::default(),
        ));
        let account = SubscriberHandle::new(EntityRef::new("Account", "9").unwrap(), engine);

        account.subscribe(&plan.id).await.unwrap();
        assert_eq!(account.current_plan().await.unwrap().id, plan.id);

        account.increment_use("seats", 1).await.unwrap();
        assert_eq!(account.consumed_use("seats").await.unwrap(), 1);
        assert_eq!(account.remaining_use("seats").await.unwrap(), 1);
        assert!(account.can_use("seats").await.unwrap());
        assert_eq!(account.clean_use("seats").await.unwrap(), 1);
        assert_eq!(account.consumed_use("seats").await.unwrap(), 0);
    }
}
