//! Integration tests for the subscription lifecycle.
//!
//! Covers subscribe, transitions, plan changes and post-commit event
//! delivery, including publishers that fail.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use subscription_meter::adapters::{
    EntityRegistry, FixedActor, FixedClock, InMemoryEventBus, InMemoryStore, StaticResolver,
};
use subscription_meter::application::{PricingEngine, Subscribable, SubscriberHandle};
use subscription_meter::config::EntitlementConfig;
use subscription_meter::domain::catalog::{EntitlementValue, Feature, Plan, PlanCadence};
use subscription_meter::domain::foundation::{
    DomainError, EntityRef, ErrorCode, EventEnvelope, Timestamp,
};
use subscription_meter::domain::subscription::{
    ChangePlanOptions, ErrorKind, SubscriptionEvent, SubscriptionStatus,
};
use subscription_meter::ports::{Clock, EventPublisher, FeatureRegistry, PlanCatalog};

// =============================================================================
// Test Infrastructure
// =============================================================================

/// Publisher that rejects every event and counts the attempts.
#[derive(Default)]
struct RejectingPublisher {
    attempts: AtomicUsize,
}

#[async_trait]
impl EventPublisher for RejectingPublisher {
    async fn publish(&self, _event: EventEnvelope) -> Result<(), DomainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::new(ErrorCode::InternalError, "broker unavailable"))
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

struct World {
    store: Arc<InMemoryStore>,
    clock: Arc<FixedClock>,
    basic: Plan,
    pro: Plan,
}

impl World {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(Timestamp::from_unix_secs(1_700_000_000)));
        let now = clock.now();

        let basic = Plan::with_cadence("Basic", "basic", 1_000, PlanCadence::Monthly, now).unwrap();
        let pro = Plan::with_cadence("Pro", "pro", 9_000, PlanCadence::Yearly, now).unwrap();
        PlanCatalog::save(store.as_ref(), &basic).await.unwrap();
        PlanCatalog::save(store.as_ref(), &pro).await.unwrap();

        let seats = Feature::new("Seats", "seats", 0, now.plus_secs(-10)).unwrap();
        FeatureRegistry::save(store.as_ref(), &seats).await.unwrap();
        for (plan, value) in [(&basic, "5"), (&pro, "50")] {
            store
                .attach_feature(&plan.id, &seats.id, EntitlementValue::new(value))
                .await
                .unwrap();
        }

        Self {
            store,
            clock,
            basic,
            pro,
        }
    }

    fn engine(&self, publisher: Arc<dyn EventPublisher>) -> Arc<PricingEngine> {
        Arc::new(PricingEngine::new(
            self.store.clone(),
            publisher,
            self.clock.clone(),
            Arc::new(FixedActor::authenticated(EntityRef::new("User", "1").unwrap())),
            &EntitlementConfig::default(),
        ))
    }
}

fn account(id: &str) -> EntityRef {
    EntityRef::new("Account", id).unwrap()
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn lifecycle_publishes_one_event_per_transition() {
    let world = World::new().await;
    let bus = Arc::new(InMemoryEventBus::new());
    let engine = world.engine(bus.clone());
    let handle = SubscriberHandle::new(account("1"), engine.clone());

    let subscription = handle.subscribe(&world.basic.id).await.unwrap();
    engine.lifecycle().cancel_recurrence(&subscription.id).await.unwrap();
    engine.lifecycle().make_recurring(&subscription.id).await.unwrap();
    handle.unsubscribe().await.unwrap();

    let types: Vec<_> = bus
        .published_events()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![
            "subscription.created.v1",
            "subscription.recurrence_canceled.v1",
            "subscription.made_recurring.v1",
            "subscription.canceled.v1",
        ]
    );
    assert!(bus
        .events_for_aggregate(&subscription.id.to_string())
        .iter()
        .all(|e| e.aggregate_type == "Subscription"));
}

#[tokio::test]
async fn plan_change_event_names_both_subscriptions() {
    let world = World::new().await;
    let bus = Arc::new(InMemoryEventBus::new());
    let handle = SubscriberHandle::new(account("1"), world.engine(bus.clone()));

    let previous = handle.subscribe(&world.basic.id).await.unwrap();
    let current = handle
        .change_plan(&world.pro.id, ChangePlanOptions::new())
        .await
        .unwrap();

    let events: Vec<SubscriptionEvent> = bus.decoded("subscription.plan_changed.v1");
    assert_eq!(events.len(), 1);
    match &events[0] {
        SubscriptionEvent::PlanChanged {
            previous_subscription_id,
            previous_plan_id,
            state,
        } => {
            assert_eq!(*previous_subscription_id, previous.id);
            assert_eq!(*previous_plan_id, world.basic.id);
            assert_eq!(state.subscription_id, current.id);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn failing_publisher_does_not_undo_transitions() {
    let world = World::new().await;
    let publisher = Arc::new(RejectingPublisher::default());
    let engine = world.engine(publisher.clone());
    let handle = SubscriberHandle::new(account("1"), engine.clone());

    let subscription = handle.subscribe(&world.basic.id).await.unwrap();
    engine.lifecycle().finish(&subscription.id).await.unwrap();

    let stored = handle.current_subscription().await.unwrap();
    assert_eq!(stored.status(world.clock.now()), SubscriptionStatus::Finished);
    assert_eq!(publisher.attempts.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Transitions
// =============================================================================

#[tokio::test]
async fn pending_subscription_can_be_started() {
    let world = World::new().await;
    let engine = world.engine(Arc::new(InMemoryEventBus::new()));
    let handle = SubscriberHandle::new(account("1"), engine.clone());
    let future_start = world.clock.now().plus_days(3);

    let err = handle
        .change_plan(&world.pro.id, ChangePlanOptions::new().start_at(future_start))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    handle.subscribe(&world.basic.id).await.unwrap();
    let pending = handle
        .change_plan(&world.pro.id, ChangePlanOptions::new().start_at(future_start))
        .await
        .unwrap();
    assert_eq!(pending.status(world.clock.now()), SubscriptionStatus::Pending);
    assert_eq!(
        handle.increment_use("seats", 1).await.unwrap_err().kind(),
        ErrorKind::InactiveSubscription
    );

    let started = engine.lifecycle().start(&pending.id).await.unwrap();
    assert_eq!(started.start_at, world.clock.now());
    assert_eq!(
        engine.lifecycle().start(&pending.id).await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}

#[tokio::test]
async fn latest_and_latest_active_can_differ() {
    let world = World::new().await;
    let engine = world.engine(Arc::new(InMemoryEventBus::new()));
    let handle = SubscriberHandle::new(account("1"), engine.clone());

    let first = handle.subscribe(&world.basic.id).await.unwrap();
    world.clock.advance_secs(60);
    let second = handle.subscribe(&world.pro.id).await.unwrap();
    engine.lifecycle().cancel(&second.id).await.unwrap();

    assert_eq!(handle.current_subscription().await.unwrap().id, second.id);
    assert_eq!(
        engine
            .lifecycle()
            .current_active_subscription(&account("1"))
            .await
            .unwrap()
            .id,
        first.id
    );
    assert_eq!(handle.subscriptions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_plan_change_leaves_state_untouched() {
    let world = World::new().await;
    let bus = Arc::new(InMemoryEventBus::new());
    let handle = SubscriberHandle::new(account("1"), world.engine(bus.clone()));
    let original = handle.subscribe(&world.basic.id).await.unwrap();
    handle.increment_use("seats", 2).await.unwrap();
    world.store.fail_usage_inserts(true);

    let err = handle
        .change_plan(&world.pro.id, ChangePlanOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert_eq!(handle.current_subscription().await.unwrap().id, original.id);
    assert_eq!(handle.consumed_use("seats").await.unwrap(), 2);
    assert!(!bus.has_event("subscription.plan_changed.v1"));
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn registry_rejects_unknown_subscribers() {
    let world = World::new().await;
    let registry =
        EntityRegistry::new().register("Account", Arc::new(StaticResolver::new(["1"])));
    let engine = Arc::new(
        PricingEngine::new(
            world.store.clone(),
            Arc::new(InMemoryEventBus::new()),
            world.clock.clone(),
            Arc::new(FixedActor::anonymous()),
            &EntitlementConfig::default(),
        )
        .with_registry(registry),
    );

    let known = SubscriberHandle::new(account("1"), engine.clone());
    let unknown = SubscriberHandle::new(account("2"), engine.clone());
    let untyped = SubscriberHandle::new(EntityRef::new("Team", "1").unwrap(), engine);

    assert!(known.subscribe(&world.basic.id).await.is_ok());
    assert!(unknown.subscribe(&world.basic.id).await.unwrap_err().is_not_found());
    assert!(untyped.subscribe(&world.basic.id).await.unwrap_err().is_not_found());
}
