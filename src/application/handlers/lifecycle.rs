//! SubscriptionLifecycle - subscribe, state transitions and subscription queries.
//!
//! Transitions load the subscription, apply the domain rule, persist it and
//! then publish the matching [`SubscriptionEvent`]. Delivery happens after the
//! write, so a failing publisher never undoes a transition.

use std::sync::Arc;

use crate::adapters::registry::EntityRegistry;
use crate::domain::catalog::Plan;
use crate::domain::foundation::{DomainEvent, EntityRef, PlanId, SubscriptionId};
use crate::domain::subscription::{
    PlanSnapshot, Subscription, SubscriptionError, SubscriptionEvent, SubscriptionState,
};
use crate::ports::{Clock, EventPublisher, PlanCatalog, SubscriptionRepository};

use super::shared::{current_subscription, publish_committed};

pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    registry: Option<EntityRegistry>,
}

impl SubscriptionLifecycle {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            publisher,
            clock,
            registry: None,
        }
    }

    /// Verify subscribers against the host's entities before subscribing them.
    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    // ════════════════════════════════════════════════════════════════════════
    // Subscribe / unsubscribe
    // ════════════════════════════════════════════════════════════════════════

    /// Subscribe `subscriber` to a plan, starting now and recurring.
    ///
    /// The plan and its entitlements are frozen into the subscription's
    /// snapshot.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the plan does not exist, or if a registry is configured
    ///   and the subscriber does not resolve
    #[tracing::instrument(skip(self, subscriber, plan_id), fields(subscriber = %subscriber, plan_id = %plan_id))]
    pub async fn subscribe(
        &self,
        subscriber: &EntityRef,
        plan_id: &PlanId,
    ) -> Result<Subscription, SubscriptionError> {
        if let Some(registry) = &self.registry {
            if !registry.exists(subscriber).await? {
                return Err(SubscriptionError::not_found("subscriber", subscriber));
            }
        }

        let plan = self.find_plan(plan_id).await?;
        let features = self.plans.features_of(&plan.id).await?;
        let now = self.clock.now();

        let subscription = Subscription::new(subscriber.clone(), &plan, now, now)
            .with_snapshot(PlanSnapshot::capture(&plan, &features, now));
        self.subscriptions.save(&subscription).await?;

        tracing::info!(subscription_id = %subscription.id, "Subscription created");

        let event = SubscriptionEvent::Created(SubscriptionState::capture(&subscription, now));
        publish_committed(self.publisher.as_ref(), &event).await;

        Ok(subscription)
    }

    /// Cancel the subscriber's current subscription.
    pub async fn unsubscribe(&self, subscriber: &EntityRef) -> Result<Subscription, SubscriptionError> {
        let subscription = current_subscription(self.subscriptions.as_ref(), subscriber).await?;
        self.cancel(&subscription.id).await
    }

    // ════════════════════════════════════════════════════════════════════════
    // Transitions
    // ════════════════════════════════════════════════════════════════════════

    /// # Errors
    ///
    /// - `InvalidState` if the subscription has already started
    pub async fn start(&self, id: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let now = self.clock.now();
        subscription.start(now)?;
        self.persist(subscription, SubscriptionEvent::Started).await
    }

    pub async fn finish(&self, id: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        subscription.finish(self.clock.now());
        self.persist(subscription, SubscriptionEvent::Finished).await
    }

    pub async fn cancel(&self, id: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        subscription.cancel(self.clock.now());
        self.persist(subscription, SubscriptionEvent::Canceled).await
    }

    /// Clear `finish_at` so the subscription runs indefinitely.
    pub async fn make_recurring(&self, id: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        subscription.make_recurring(self.clock.now());
        self.persist(subscription, SubscriptionEvent::MadeRecurring).await
    }

    /// End the subscription one billing cycle of its plan after `start_at`.
    pub async fn cancel_recurrence(
        &self,
        id: &SubscriptionId,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let plan = self.find_plan(&subscription.plan_id).await?;
        subscription.cancel_recurrence(&plan, self.clock.now())?;
        self.persist(subscription, SubscriptionEvent::RecurrenceCanceled).await
    }

    // ════════════════════════════════════════════════════════════════════════
    // Queries
    // ════════════════════════════════════════════════════════════════════════

    /// Most recently created subscription, active or not.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the subscriber has no subscription
    pub async fn current_subscription(
        &self,
        subscriber: &EntityRef,
    ) -> Result<Subscription, SubscriptionError> {
        current_subscription(self.subscriptions.as_ref(), subscriber).await
    }

    /// Most recently created subscription that is active now.
    ///
    /// # Errors
    ///
    /// - `NotFound` if none is active
    pub async fn current_active_subscription(
        &self,
        subscriber: &EntityRef,
    ) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .latest_active_for(subscriber, self.clock.now())
            .await?
            .ok_or_else(|| SubscriptionError::not_found("active subscription", subscriber))
    }

    pub async fn current_plan(&self, subscriber: &EntityRef) -> Result<Plan, SubscriptionError> {
        let subscription = self.current_subscription(subscriber).await?;
        self.find_plan(&subscription.plan_id).await
    }

    /// Every live subscription of the subscriber, newest first.
    pub async fn subscriptions_of(
        &self,
        subscriber: &EntityRef,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self.subscriptions.list_for(subscriber).await?)
    }

    /// Trial length read from the plan as it is now, not from the snapshot.
    pub async fn trial_days(&self, id: &SubscriptionId) -> Result<u32, SubscriptionError> {
        let subscription = self.load(id).await?;
        Ok(self.find_plan(&subscription.plan_id).await?.trial_period_days)
    }

    pub async fn has_trial(&self, id: &SubscriptionId) -> Result<bool, SubscriptionError> {
        Ok(self.trial_days(id).await? > 0)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════════════════

    async fn load(&self, id: &SubscriptionId) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .find_by_id(id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("subscription", id))
    }

    async fn find_plan(&self, id: &PlanId) -> Result<Plan, SubscriptionError> {
        self.plans
            .find(id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("plan", id))
    }

    async fn persist(
        &self,
        subscription: Subscription,
        event: fn(SubscriptionState) -> SubscriptionEvent,
    ) -> Result<Subscription, SubscriptionError> {
        self.subscriptions.update(&subscription).await?;

        let event = event(SubscriptionState::capture(&subscription, self.clock.now()));
        tracing::info!(
            subscription_id = %subscription.id,
            event_type = event.event_type(),
            "Subscription transition applied"
        );
        publish_committed(self.publisher.as_ref(), &event).await;

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::registry::StaticResolver;
    use crate::adapters::{FixedClock, InMemoryEventBus, InMemoryStore};
    use crate::domain::catalog::PlanCadence;
    use crate::domain::foundation::Timestamp;
    use crate::domain::subscription::{ErrorKind, SubscriptionStatus};

    struct Fixture {
        store: InMemoryStore,
        bus: Arc<InMemoryEventBus>,
        clock: Arc<FixedClock>,
        plan: Plan,
        lifecycle: SubscriptionLifecycle,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(Timestamp::from_unix_secs(1_700_000_000)));

        let plan = Plan::with_cadence("Basic", "basic", 1_000, PlanCadence::Monthly, clock.now())
            .unwrap()
            .with_trial_days(14);
        PlanCatalog::save(&store, &plan).await.unwrap();

        let lifecycle = SubscriptionLifecycle::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            bus.clone(),
            clock.clone(),
        );

        Fixture {
            store,
            bus,
            clock,
            plan,
            lifecycle,
        }
    }

    fn account() -> EntityRef {
        EntityRef::new("Account", "1").unwrap()
    }

    #[tokio::test]
    async fn subscribe_creates_active_recurrent_subscription() {
        let f = fixture().await;

        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        assert!(sub.is_active(f.clock.now()));
        assert!(sub.is_recurrent());
        assert_eq!(sub.immutable_plan.as_ref().map(|s| s.slug.as_str()), Some("basic"));
        assert!(f.bus.has_event("subscription.created.v1"));
    }

    #[tokio::test]
    async fn subscribe_to_unknown_plan_is_not_found() {
        let f = fixture().await;
        let err = f.lifecycle.subscribe(&account(), &PlanId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn registry_rejects_unknown_subscriber() {
        let f = fixture().await;
        let lifecycle = SubscriptionLifecycle::new(
            Arc::new(f.store.clone()),
            Arc::new(f.store.clone()),
            f.bus.clone(),
            f.clock.clone(),
        )
        .with_registry(
            EntityRegistry::new().register("Account", Arc::new(StaticResolver::new(["2"]))),
        );

        let err = lifecycle.subscribe(&account(), &f.plan.id).await.unwrap_err();

        assert!(err.is_not_found());
        assert!(f.store.all_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn start_of_started_subscription_is_invalid_state() {
        let f = fixture().await;
        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        let err = f.lifecycle.start(&sub.id).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!f.bus.has_event("subscription.started.v1"));
    }

    #[tokio::test]
    async fn start_of_pending_subscription_emits_one_event() {
        let f = fixture().await;
        let future = Subscription::new(
            account(),
            &f.plan,
            f.clock.now().plus_days(3),
            f.clock.now(),
        );
        SubscriptionRepository::save(&f.store, &future).await.unwrap();

        let started = f.lifecycle.start(&future.id).await.unwrap();

        assert_eq!(started.start_at, f.clock.now());
        assert_eq!(f.bus.events_of_type("subscription.started.v1").len(), 1);
    }

    #[tokio::test]
    async fn cancel_then_make_recurring_keeps_cancellation() {
        let f = fixture().await;
        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        f.lifecycle.cancel(&sub.id).await.unwrap();
        let sub = f.lifecycle.make_recurring(&sub.id).await.unwrap();

        assert_eq!(sub.status(f.clock.now()), SubscriptionStatus::Canceled);
        assert!(f.bus.has_event("subscription.canceled.v1"));
        assert!(f.bus.has_event("subscription.made_recurring.v1"));
    }

    #[tokio::test]
    async fn cancel_recurrence_ends_after_one_cycle() {
        let f = fixture().await;
        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        let sub = f.lifecycle.cancel_recurrence(&sub.id).await.unwrap();

        assert_eq!(sub.finish_at, sub.start_at.checked_add_months(1));
        assert!(!sub.is_recurrent());
        assert!(f.bus.has_event("subscription.recurrence_canceled.v1"));
    }

    #[tokio::test]
    async fn finish_makes_subscription_inactive() {
        let f = fixture().await;
        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        f.lifecycle.finish(&sub.id).await.unwrap();

        let current = f.lifecycle.current_subscription(&account()).await.unwrap();
        assert!(!current.is_active(f.clock.now()));
        let err = f.lifecycle.current_active_subscription(&account()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn current_subscription_without_any_is_not_found() {
        let f = fixture().await;
        let err = f.lifecycle.current_subscription(&account()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn unsubscribe_cancels_current() {
        let f = fixture().await;
        f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();

        let sub = f.lifecycle.unsubscribe(&account()).await.unwrap();

        assert!(sub.is_canceled());
    }

    #[tokio::test]
    async fn trial_is_read_from_live_plan() {
        let f = fixture().await;
        let sub = f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();
        assert_eq!(f.lifecycle.trial_days(&sub.id).await.unwrap(), 14);

        let mut plan = f.plan.clone();
        plan.trial_period_days = 0;
        PlanCatalog::save(&f.store, &plan).await.unwrap();

        assert!(!f.lifecycle.has_trial(&sub.id).await.unwrap());
    }

    #[tokio::test]
    async fn current_plan_follows_subscription() {
        let f = fixture().await;
        f.lifecycle.subscribe(&account(), &f.plan.id).await.unwrap();
        assert_eq!(f.lifecycle.current_plan(&account()).await.unwrap().id, f.plan.id);
    }
}
