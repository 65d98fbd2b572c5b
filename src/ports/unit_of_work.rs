//! UnitOfWork port - transactional writes over the ledger and subscriptions.
//!
//! Every ledger mutation and every plan change runs inside one
//! [`StoreTransaction`]. Either `commit()` makes all of its writes visible,
//! or none of them are: dropping the transaction or calling `rollback()`
//! discards everything.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = uow.begin().await?;
//! if let Some(mut usage) = tx.lock_usage(&subscription.id, &feature.id).await? {
//!     usage.increment(1, now);
//!     tx.update_usage(&usage).await?;
//! }
//! tx.append_activity(&activity).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, FeatureId, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};

/// Strength of a subscription row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Blocks replacement or deletion, not other shared holders.
    Shared,
    /// Waits for every shared holder and blocks new ones.
    Exclusive,
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;
}

/// An open transaction.
///
/// Reads inside the transaction see its own uncommitted writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fetch the live subscription and lock it until the transaction ends.
    ///
    /// `None` if it does not exist or has been deleted.
    async fn lock_subscription(
        &mut self,
        id: &SubscriptionId,
        mode: LockMode,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Fetch the live usage row for the pair and hold it exclusively until
    /// the transaction ends.
    async fn lock_usage(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError>;

    /// # Errors
    ///
    /// - `UniqueViolation` if a live row already exists for (feature, subscription)
    async fn insert_usage(&mut self, usage: &Usage) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `NotFound` if the row does not exist
    async fn update_usage(&mut self, usage: &Usage) -> Result<(), DomainError>;

    /// Live usage rows of a subscription.
    async fn usages_of(&mut self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError>;

    /// Soft-delete the live rows for the pair. Returns the number affected.
    async fn soft_delete_usages(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
        now: Timestamp,
    ) -> Result<u64, DomainError>;

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), DomainError>;

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Soft-delete a subscription together with its usage rows.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the subscription does not exist
    async fn soft_delete_subscription(
        &mut self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
