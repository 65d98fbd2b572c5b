//! Append-only audit records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ActivityId, EntityRef, Timestamp};

use super::UsageChange;

/// Before/after snapshot stored with an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityChanges {
    pub before: u64,
    pub after: u64,
}

impl From<UsageChange> for ActivityChanges {
    fn from(change: UsageChange) -> Self {
        Self {
            before: change.before,
            after: change.after,
        }
    }
}

/// What changed, on which subject, caused by whom.
///
/// Immutable once written. Carries no update timestamp and no tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub description: String,
    pub changes: Option<ActivityChanges>,
    pub subject: EntityRef,
    pub causer: EntityRef,
    pub created_at: Timestamp,
}

impl Activity {
    pub fn record(
        description: impl Into<String>,
        changes: Option<ActivityChanges>,
        subject: EntityRef,
        causer: EntityRef,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ActivityId::new(),
            description: description.into(),
            changes,
            subject,
            causer,
            created_at: now,
        }
    }

    pub fn incremented(
        amount: u64,
        feature_name: &str,
        change: UsageChange,
        subject: EntityRef,
        causer: EntityRef,
        now: Timestamp,
    ) -> Self {
        Self::record(
            format!("incremented {} {}", amount, feature_name),
            Some(change.into()),
            subject,
            causer,
            now,
        )
    }

    pub fn decremented(
        amount: u64,
        feature_name: &str,
        change: UsageChange,
        subject: EntityRef,
        causer: EntityRef,
        now: Timestamp,
    ) -> Self {
        Self::record(
            format!("decremented {} {}", amount, feature_name),
            Some(change.into()),
            subject,
            causer,
            now,
        )
    }
}
