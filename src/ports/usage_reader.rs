//! UsageReader port - non-transactional ledger reads.
//!
//! Reads tolerate lagging behind in-flight mutations. Writes go through
//! [`StoreTransaction`](super::StoreTransaction).

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, FeatureId, SubscriptionId};
use crate::domain::usage::Usage;

#[async_trait]
pub trait UsageReader: Send + Sync {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError>;

    /// Sum of `used` over live rows for the pair; 0 when none exist.
    async fn consumed(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<u64, DomainError>;

    async fn list_for(&self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError>;
}
