//! Per-(subscription, feature) consumption counter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{EntityRef, FeatureId, SubscriptionId, Timestamp, UsageId};

/// Type tag used when a usage row is the subject of an activity.
pub const USAGE_ENTITY_TYPE: &str = "Usage";

/// Counter value before and after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageChange {
    pub before: u64,
    pub after: u64,
}

/// Ledger row. At most one live row exists per (feature, subscription).
///
/// Rows are created lazily on first increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub id: UsageId,
    pub subscription_id: SubscriptionId,
    pub feature_id: FeatureId,
    pub used: u64,
    /// Opaque host data, copied verbatim on plan change.
    pub metadata: Option<Map<String, JsonValue>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Usage {
    pub fn new(subscription_id: SubscriptionId, feature_id: FeatureId, now: Timestamp) -> Self {
        Self {
            id: UsageId::new(),
            subscription_id,
            feature_id,
            used: 0,
            metadata: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::for_record(USAGE_ENTITY_TYPE, self.id)
    }

    pub fn increment(&mut self, amount: u64, now: Timestamp) -> UsageChange {
        let before = self.used;
        self.used = before.saturating_add(amount);
        self.updated_at = now;
        UsageChange {
            before,
            after: self.used,
        }
    }

    /// Subtracts `amount`, flooring at zero.
    pub fn decrement(&mut self, amount: u64, now: Timestamp) -> UsageChange {
        let before = self.used;
        self.used = before.saturating_sub(amount);
        self.updated_at = now;
        UsageChange {
            before,
            after: self.used,
        }
    }

    /// Copy of this row bound to another subscription.
    pub fn carry_over(&self, subscription_id: SubscriptionId, now: Timestamp) -> Self {
        Self {
            id: UsageId::new(),
            subscription_id,
            feature_id: self.feature_id,
            used: self.used,
            metadata: self.metadata.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn soft_delete(&mut self, now: Timestamp) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
