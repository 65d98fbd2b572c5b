//! SubscriptionRepository port.
//!
//! Soft-deleted subscriptions are invisible to every query here.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EntityRef, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Most recently created subscription of the subscriber, in any state.
    async fn latest_for(&self, subscriber: &EntityRef) -> Result<Option<Subscription>, DomainError>;

    /// Most recently created subscription that is active at `now`.
    async fn latest_active_for(
        &self,
        subscriber: &EntityRef,
        now: Timestamp,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Every subscription of the subscriber, newest first.
    async fn list_for(&self, subscriber: &EntityRef) -> Result<Vec<Subscription>, DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Persist lifecycle fields of an existing subscription.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the subscription does not exist
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Soft-delete a subscription and its usages.
    async fn delete(&self, id: &SubscriptionId, now: Timestamp) -> Result<(), DomainError>;
}
