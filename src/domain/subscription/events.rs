//! Subscription lifecycle events.
//!
//! Emitted after the transition commits, for consumers such as billing and
//! notifications. Each payload carries the subscription's identity and the
//! state it ended up in.
//!
//! Events are named in past tense: `Started`, not `Start`.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DomainEvent, EntityRef, EventId, PlanId, SubscriptionId, Timestamp,
};

use super::{Subscription, SubscriptionStatus};

/// Resulting state of a subscription after a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub subscriber: EntityRef,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub start_at: Timestamp,
    pub finish_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    pub occurred_at: Timestamp,
}

impl SubscriptionState {
    pub fn capture(subscription: &Subscription, now: Timestamp) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            subscriber: subscription.subscriber.clone(),
            plan_id: subscription.plan_id,
            status: subscription.status(now),
            start_at: subscription.start_at,
            finish_at: subscription.finish_at,
            canceled_at: subscription.canceled_at,
            occurred_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Created(SubscriptionState),
    Started(SubscriptionState),
    Finished(SubscriptionState),
    Canceled(SubscriptionState),
    MadeRecurring(SubscriptionState),
    RecurrenceCanceled(SubscriptionState),

    /// The subscriber moved to another plan. `state` describes the new
    /// subscription; the previous one has been deleted.
    PlanChanged {
        previous_subscription_id: SubscriptionId,
        previous_plan_id: PlanId,
        state: SubscriptionState,
    },
}

impl SubscriptionEvent {
    /// The post-transition state carried by every variant.
    pub fn state(&self) -> &SubscriptionState {
        match self {
            SubscriptionEvent::Created(state)
            | SubscriptionEvent::Started(state)
            | SubscriptionEvent::Finished(state)
            | SubscriptionEvent::Canceled(state)
            | SubscriptionEvent::MadeRecurring(state)
            | SubscriptionEvent::RecurrenceCanceled(state)
            | SubscriptionEvent::PlanChanged { state, .. } => state,
        }
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        self.state().subscription_id
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::Created(_) => "subscription.created.v1",
            SubscriptionEvent::Started(_) => "subscription.started.v1",
            SubscriptionEvent::Finished(_) => "subscription.finished.v1",
            SubscriptionEvent::Canceled(_) => "subscription.canceled.v1",
            SubscriptionEvent::MadeRecurring(_) => "subscription.made_recurring.v1",
            SubscriptionEvent::RecurrenceCanceled(_) => "subscription.recurrence_canceled.v1",
            SubscriptionEvent::PlanChanged { .. } => "subscription.plan_changed.v1",
        }
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id().to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        self.state().occurred_at
    }

    fn event_id(&self) -> EventId {
        self.state().event_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Plan, PlanCadence};
    use crate::domain::foundation::SerializableDomainEvent;

    fn subscription() -> Subscription {
        let now = Timestamp::from_unix_secs(0);
        let plan = Plan::with_cadence("Basic", "basic", 100, PlanCadence::Monthly, now).unwrap();
        Subscription::new(EntityRef::new("Account", "1").unwrap(), &plan, now, now)
    }

    #[test]
    fn state_reflects_the_subscription() {
        let mut sub = subscription();
        sub.cancel(Timestamp::from_unix_secs(5));

        let state = SubscriptionState::capture(&sub, Timestamp::from_unix_secs(6));

        assert_eq!(state.subscription_id, sub.id);
        assert_eq!(state.status, SubscriptionStatus::Canceled);
        assert_eq!(state.canceled_at, Some(Timestamp::from_unix_secs(5)));
    }

    #[test]
    fn event_types_are_versioned() {
        let state = SubscriptionState::capture(&subscription(), Timestamp::from_unix_secs(1));
        assert_eq!(SubscriptionEvent::Started(state.clone()).event_type(), "subscription.started.v1");
        assert_eq!(
            SubscriptionEvent::RecurrenceCanceled(state).event_type(),
            "subscription.recurrence_canceled.v1"
        );
    }

    #[test]
    fn envelope_carries_subscription_identity() {
        let sub = subscription();
        let event = SubscriptionEvent::PlanChanged {
            previous_subscription_id: SubscriptionId::new(),
            previous_plan_id: PlanId::new(),
            state: SubscriptionState::capture(&sub, Timestamp::from_unix_secs(1)),
        };

        let envelope = event.to_envelope().unwrap();

        assert_eq!(envelope.aggregate_type, "Subscription");
        assert_eq!(envelope.aggregate_id, sub.id.to_string());
        assert_eq!(envelope.payload["kind"], "plan_changed");
        assert_eq!(envelope.payload_as::<SubscriptionEvent>().unwrap(), event);
    }
}
