//! ChangePlanHandler - Command handler for moving a subscriber to another plan.

use std::sync::Arc;

use crate::domain::foundation::{EntityRef, PlanId};
use crate::domain::subscription::{
    ChangePlanOptions, PlanSnapshot, Subscription, SubscriptionError, SubscriptionEvent,
    SubscriptionState,
};
use crate::ports::{
    Clock, EventPublisher, LockMode, PlanCatalog, SubscriptionRepository, UnitOfWork,
};

use super::shared::{current_subscription, lock_live, publish_committed};

/// Command to change the plan of a subscriber's current subscription.
#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub subscriber: EntityRef,
    pub plan_id: PlanId,
    pub options: ChangePlanOptions,
}

/// Result of a committed plan change.
#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    pub subscription: Subscription,
    pub previous: Subscription,
    /// Number of usage rows copied to the new subscription.
    pub carried_usages: usize,
    pub event: SubscriptionEvent,
}

/// Handler for plan changes.
///
/// One transaction creates the new subscription, copies every usage row of
/// the current one onto it and soft-deletes the current one. Any failure
/// rolls all three back. `PlanChanged` is published after commit.
pub struct ChangePlanHandler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanCatalog>,
    uow: Arc<dyn UnitOfWork>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ChangePlanHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanCatalog>,
        uow: Arc<dyn UnitOfWork>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            uow,
            publisher,
            clock,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(subscriber = %cmd.subscriber, plan_id = %cmd.plan_id))]
    pub async fn handle(&self, cmd: ChangePlanCommand) -> Result<ChangePlanResult, SubscriptionError> {
        cmd.options.validate()?;

        // 1. Resolve the current subscription and the target plan
        let previous = current_subscription(self.subscriptions.as_ref(), &cmd.subscriber).await?;
        let plan = self
            .plans
            .find(&cmd.plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("plan", cmd.plan_id))?;
        let features = self.plans.features_of(&plan.id).await?;
        let now = self.clock.now();

        // 2. Build the replacement from the options, falling back to defaults
        let mut subscription = Subscription::new(
            cmd.subscriber.clone(),
            &plan,
            cmd.options.start_at.unwrap_or(now),
            now,
        )
        .with_finish_at(cmd.options.finish_at)
        .with_due_day(cmd.options.due_day.or(previous.due_day))
        .with_snapshot(PlanSnapshot::capture(&plan, &features, now));
        if let Some(name) = &cmd.options.name {
            subscription = subscription.with_name(name.clone());
        }

        // 3. Swap subscriptions atomically
        // The exclusive lock waits for in-flight ledger writes on the old
        // subscription, so none of them land after its usages are copied.
        let mut tx = self.uow.begin().await?;
        let previous = lock_live(&mut *tx, &previous, LockMode::Exclusive).await?;
        tx.insert_subscription(&subscription).await?;

        let usages = tx.usages_of(&previous.id).await?;
        for usage in &usages {
            tx.insert_usage(&usage.carry_over(subscription.id, now)).await?;
        }

        tx.soft_delete_subscription(&previous.id, now).await?;
        tx.commit().await?;

        tracing::info!(
            previous_subscription_id = %previous.id,
            subscription_id = %subscription.id,
            carried_usages = usages.len(),
            "Plan changed"
        );

        // 4. Publish after commit
        let event = SubscriptionEvent::PlanChanged {
            previous_subscription_id: previous.id,
            previous_plan_id: previous.plan_id,
            state: SubscriptionState::capture(&subscription, now),
        };
        publish_committed(self.publisher.as_ref(), &event).await;

        Ok(ChangePlanResult {
            subscription,
            previous,
            carried_usages: usages.len(),
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FixedClock, InMemoryEventBus, InMemoryStore};
    use crate::domain::catalog::{Plan, PlanCadence};
    use crate::domain::foundation::{FeatureId, Timestamp};
    use crate::domain::subscription::ErrorKind;
    use crate::domain::usage::Usage;
    use crate::ports::UsageReader;
    use serde_json::json;

    struct Fixture {
        store: InMemoryStore,
        bus: Arc<InMemoryEventBus>,
        clock: Arc<FixedClock>,
        basic: Plan,
        pro: Plan,
        current: Subscription,
        handler: ChangePlanHandler,
    }

    fn account() -> EntityRef {
        EntityRef::new("Account", "1").unwrap()
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = Arc::new(FixedClock::new(Timestamp::from_unix_secs(1_700_000_000)));
        let now = clock.now();

        let basic = Plan::with_cadence("Basic", "basic", 1_000, PlanCadence::Monthly, now).unwrap();
        let pro = Plan::with_cadence("Pro", "pro", 5_000, PlanCadence::Yearly, now).unwrap();
        PlanCatalog::save(&store, &basic).await.unwrap();
        PlanCatalog::save(&store, &pro).await.unwrap();

        let current = Subscription::new(account(), &basic, now, now).with_due_day(Some(10));
        SubscriptionRepository::save(&store, &current).await.unwrap();

        let handler = ChangePlanHandler::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            bus.clone(),
            clock.clone(),
        );

        Fixture {
            store,
            bus,
            clock,
            basic,
            pro,
            current,
            handler,
        }
    }

    async fn seed_usage(f: &Fixture, used: u64) -> FeatureId {
        let feature_id = FeatureId::new();
        let mut usage = Usage::new(f.current.id, feature_id, f.clock.now());
        usage.used = used;
        let usage = usage.with_metadata(json!({"seat": "a"}).as_object().cloned().unwrap());

        let mut tx = f.store.begin().await.unwrap();
        tx.insert_usage(&usage).await.unwrap();
        tx.commit().await.unwrap();
        feature_id
    }

    fn command(f: &Fixture, options: ChangePlanOptions) -> ChangePlanCommand {
        ChangePlanCommand {
            subscriber: account(),
            plan_id: f.pro.id,
            options,
        }
    }

    #[tokio::test]
    async fn moves_subscriber_and_carries_usage() {
        let f = fixture().await;
        let feature_id = seed_usage(&f, 7).await;

        let result = f.handler.handle(command(&f, ChangePlanOptions::new())).await.unwrap();

        assert_eq!(result.subscription.plan_id, f.pro.id);
        assert_eq!(result.subscription.name, "Pro");
        assert_eq!(result.subscription.due_day, Some(10));
        assert!(result.subscription.is_recurrent());
        assert_eq!(result.carried_usages, 1);

        let carried = UsageReader::find(&f.store, &result.subscription.id, &feature_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(carried.used, 7);
        assert_eq!(carried.metadata.unwrap()["seat"], json!("a"));

        assert!(SubscriptionRepository::find_by_id(&f.store, &f.current.id)
            .await
            .unwrap()
            .is_none());
        assert!(f.bus.has_event("subscription.plan_changed.v1"));
    }

    #[tokio::test]
    async fn options_override_defaults() {
        let f = fixture().await;
        let start = f.clock.now().plus_days(1);
        let finish = f.clock.now().plus_days(30);
        let options = ChangePlanOptions::new()
            .name("Pro (promo)")
            .due_day(5)
            .start_at(start)
            .finish_at(finish);

        let result = f.handler.handle(command(&f, options)).await.unwrap();

        assert_eq!(result.subscription.name, "Pro (promo)");
        assert_eq!(result.subscription.due_day, Some(5));
        assert_eq!(result.subscription.start_at, start);
        assert_eq!(result.subscription.finish_at, Some(finish));
    }

    #[tokio::test]
    async fn failed_usage_copy_rolls_everything_back() {
        let f = fixture().await;
        seed_usage(&f, 3).await;
        f.store.fail_usage_inserts(true);

        let err = f.handler.handle(command(&f, ChangePlanOptions::new())).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        let rows = f.store.all_subscriptions().await;
        assert_eq!(rows, vec![f.current.clone()]);
        assert_eq!(f.store.all_usages().await.len(), 1);
        assert!(!f.bus.has_event("subscription.plan_changed.v1"));
    }

    #[tokio::test]
    async fn invalid_due_day_is_rejected_before_any_write() {
        let f = fixture().await;

        let err = f
            .handler
            .handle(command(&f, ChangePlanOptions::new().due_day(32)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(f.store.all_subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let f = fixture().await;
        let cmd = ChangePlanCommand {
            subscriber: account(),
            plan_id: PlanId::new(),
            options: ChangePlanOptions::new(),
        };

        assert!(f.handler.handle(cmd).await.unwrap_err().is_not_found());
        assert_eq!(f.basic.id, f.current.plan_id);
    }
}
