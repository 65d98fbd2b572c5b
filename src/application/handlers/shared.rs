//! Lookups and post-commit delivery shared by the handlers.

use crate::domain::foundation::{EntityRef, SerializableDomainEvent, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionEvent};
use crate::ports::{EventPublisher, LockMode, StoreTransaction, SubscriptionRepository};

/// Most recently created subscription of `subscriber`.
pub(crate) async fn current_subscription(
    subscriptions: &dyn SubscriptionRepository,
    subscriber: &EntityRef,
) -> Result<Subscription, SubscriptionError> {
    subscriptions
        .latest_for(subscriber)
        .await?
        .ok_or_else(|| SubscriptionError::not_found("subscription", subscriber))
}

pub(crate) fn ensure_active(
    subscription: &Subscription,
    now: Timestamp,
) -> Result<(), SubscriptionError> {
    if subscription.is_active(now) {
        Ok(())
    } else {
        Err(SubscriptionError::inactive(subscription.id))
    }
}

/// Re-reads `subscription` under a row lock inside `tx`.
///
/// The copy read before the transaction may have been replaced or deleted
/// since; only the locked row is safe to write against.
pub(crate) async fn lock_live(
    tx: &mut dyn StoreTransaction,
    subscription: &Subscription,
    mode: LockMode,
) -> Result<Subscription, SubscriptionError> {
    tx.lock_subscription(&subscription.id, mode)
        .await?
        .ok_or_else(|| SubscriptionError::not_found("subscription", subscription.id))
}

/// Delivers a lifecycle event once its transaction has committed.
///
/// State is already durable at this point, so a failed delivery is logged
/// and never reported to the caller.
pub(crate) async fn publish_committed(publisher: &dyn EventPublisher, event: &SubscriptionEvent) {
    let envelope = match event.to_envelope() {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                subscription_id = %event.subscription_id(),
                error = %e,
                "Failed to serialize subscription event"
            );
            return;
        }
    };

    let event_type = envelope.event_type.clone();
    if let Err(e) = publisher.publish(envelope).await {
        tracing::warn!(
            subscription_id = %event.subscription_id(),
            event_type = %event_type,
            error = %e,
            "Failed to publish subscription event"
        );
    }
}
