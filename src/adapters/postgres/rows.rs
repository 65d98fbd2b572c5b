//! Row types and conversions shared by the PostgreSQL store.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::catalog::{EntitlementValue, Feature, Plan, PlanFeature};
use crate::domain::foundation::{
    ActivityId, DomainError, EntityRef, ErrorCode, FeatureId, PlanId, SubscriptionId, Timestamp,
    UsageId,
};
use crate::domain::subscription::{PlanSnapshot, Subscription};
use crate::domain::usage::{Activity, ActivityChanges, Usage};

pub(super) const PLAN_COLUMNS: &str = r#"id, name, slug, description, price, "interval", period,
    trial_period_days, sort_order, created_at, updated_at, deleted_at"#;

pub(super) const FEATURE_COLUMNS: &str =
    "id, name, slug, sort_order, created_at, updated_at, deleted_at";

pub(super) const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_type, subscriber_id, plan_id, name, slug,
    start_at, finish_at, canceled_at, due_day, immutable_plan, created_at, updated_at, deleted_at";

pub(super) const USAGE_COLUMNS: &str =
    "id, subscription_id, feature_id, used, metadata, created_at, updated_at, deleted_at";

pub(super) const ACTIVITY_COLUMNS: &str =
    "id, description, changes, subject_type, subject_id, causer_type, causer_id, created_at";

/// Maps a sqlx error, surfacing unique and foreign-key violations by code.
pub(super) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                Some("23505") => {
                    return DomainError::unique_violation(db.constraint().unwrap_or("unknown"))
                }
                Some("23503") => {
                    return DomainError::new(
                        ErrorCode::NotFound,
                        format!("{}: referenced row does not exist", context),
                    )
                }
                _ => {}
            }
        }
        DomainError::database(format!("{}: {}", context, e))
    }
}

fn corrupt(column: &str, detail: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, detail),
    )
}

pub(super) fn to_i32(column: &str, value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|e| corrupt(column, e))
}

pub(super) fn to_i64(column: &str, value: u64) -> Result<i64, DomainError> {
    i64::try_from(value).map_err(|e| corrupt(column, e))
}

pub(super) fn dt(ts: Timestamp) -> DateTime<Utc> {
    *ts.as_datetime()
}

pub(super) fn opt_dt(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(dt)
}

fn ts(value: DateTime<Utc>) -> Timestamp {
    Timestamp::from_datetime(value)
}

fn opt_ts(value: Option<DateTime<Utc>>) -> Option<Timestamp> {
    value.map(Timestamp::from_datetime)
}

// ============================================================
// Catalog
// ============================================================

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PlanRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    price: i64,
    interval: String,
    period: i32,
    trial_period_days: i32,
    sort_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<PlanRow> for Plan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(Plan {
            id: PlanId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            interval: row.interval.parse().map_err(|e| corrupt("interval", e))?,
            period: u32::try_from(row.period).map_err(|e| corrupt("period", e))?,
            trial_period_days: u32::try_from(row.trial_period_days)
                .map_err(|e| corrupt("trial_period_days", e))?,
            sort_order: row.sort_order,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            deleted_at: opt_ts(row.deleted_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct FeatureRow {
    id: Uuid,
    name: String,
    slug: String,
    sort_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<FeatureRow> for Feature {
    fn from(row: FeatureRow) -> Self {
        Feature {
            id: FeatureId::from_uuid(row.id),
            name: row.name,
            slug: row.slug,
            sort_order: row.sort_order,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            deleted_at: opt_ts(row.deleted_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct PlanFeatureRow {
    #[sqlx(flatten)]
    feature: FeatureRow,
    value: String,
}

impl From<PlanFeatureRow> for PlanFeature {
    fn from(row: PlanFeatureRow) -> Self {
        PlanFeature::new(row.feature.into(), EntitlementValue::new(row.value))
    }
}

// ============================================================
// Subscriptions
// ============================================================

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    subscriber_type: String,
    subscriber_id: String,
    plan_id: Uuid,
    name: String,
    slug: String,
    start_at: DateTime<Utc>,
    finish_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    due_day: Option<i16>,
    immutable_plan: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let immutable_plan = row
            .immutable_plan
            .map(serde_json::from_value::<PlanSnapshot>)
            .transpose()
            .map_err(|e| corrupt("immutable_plan", e))?;
        let due_day = row
            .due_day
            .map(u8::try_from)
            .transpose()
            .map_err(|e| corrupt("due_day", e))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            subscriber: EntityRef::new(row.subscriber_type, row.subscriber_id)?,
            plan_id: PlanId::from_uuid(row.plan_id),
            name: row.name,
            slug: row.slug,
            start_at: ts(row.start_at),
            finish_at: opt_ts(row.finish_at),
            canceled_at: opt_ts(row.canceled_at),
            due_day,
            immutable_plan,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            deleted_at: opt_ts(row.deleted_at),
        })
    }
}

pub(super) fn snapshot_json(subscription: &Subscription) -> Result<Option<JsonValue>, DomainError> {
    subscription
        .immutable_plan
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("immutable_plan: {}", e)))
}

// ============================================================
// Ledger
// ============================================================

#[derive(Debug, sqlx::FromRow)]
pub(super) struct UsageRow {
    id: Uuid,
    subscription_id: Uuid,
    feature_id: Uuid,
    used: i64,
    metadata: Option<JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UsageRow> for Usage {
    type Error = DomainError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        let metadata = match row.metadata {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(map)) => Some(map),
            Some(other) => return Err(corrupt("metadata", format!("expected object, got {}", other))),
        };

        Ok(Usage {
            id: UsageId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            feature_id: FeatureId::from_uuid(row.feature_id),
            used: u64::try_from(row.used).map_err(|e| corrupt("used", e))?,
            metadata,
            created_at: ts(row.created_at),
            updated_at: ts(row.updated_at),
            deleted_at: opt_ts(row.deleted_at),
        })
    }
}

pub(super) fn metadata_json(usage: &Usage) -> Option<JsonValue> {
    usage.metadata.clone().map(JsonValue::Object)
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ActivityRow {
    id: Uuid,
    description: String,
    changes: Option<JsonValue>,
    subject_type: String,
    subject_id: String,
    causer_type: String,
    causer_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for Activity {
    type Error = DomainError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let changes = row
            .changes
            .filter(|v| !v.is_null())
            .map(serde_json::from_value::<ActivityChanges>)
            .transpose()
            .map_err(|e| corrupt("changes", e))?;

        Ok(Activity {
            id: ActivityId::from_uuid(row.id),
            description: row.description,
            changes,
            subject: EntityRef::new(row.subject_type, row.subject_id)?,
            causer: EntityRef::new(row.causer_type, row.causer_id)?,
            created_at: ts(row.created_at),
        })
    }
}

pub(super) fn changes_json(activity: &Activity) -> Result<Option<JsonValue>, DomainError> {
    activity
        .changes
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("changes: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usage_row(used: i64, metadata: Option<JsonValue>) -> UsageRow {
        let now = Utc::now();
        UsageRow {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            feature_id: Uuid::new_v4(),
            used,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn usage_row_converts_object_metadata() {
        let usage = Usage::try_from(usage_row(3, Some(json!({"k": "v"})))).unwrap();
        assert_eq!(usage.used, 3);
        assert_eq!(usage.metadata.unwrap()["k"], json!("v"));
    }

    #[test]
    fn negative_used_is_rejected() {
        let err = Usage::try_from(usage_row(-1, None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn scalar_metadata_is_rejected() {
        assert!(Usage::try_from(usage_row(0, Some(json!(5)))).is_err());
    }

    #[test]
    fn plan_row_with_unknown_interval_is_rejected() {
        let now = Utc::now();
        let row = PlanRow {
            id: Uuid::new_v4(),
            name: "Basic".to_string(),
            slug: "basic".to_string(),
            description: None,
            price: 0,
            interval: "fortnight".to_string(),
            period: 1,
            trial_period_days: 0,
            sort_order: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(Plan::try_from(row).is_err());
    }

    #[test]
    fn activity_changes_decode_from_json() {
        let row = ActivityRow {
            id: Uuid::new_v4(),
            description: "incremented 1 Users".to_string(),
            changes: Some(json!({"before": 0, "after": 1})),
            subject_type: "Usage".to_string(),
            subject_id: "u-1".to_string(),
            causer_type: "User".to_string(),
            causer_id: "42".to_string(),
            created_at: Utc::now(),
        };

        let activity = Activity::try_from(row).unwrap();

        assert_eq!(activity.changes, Some(ActivityChanges { before: 0, after: 1 }));
    }
}
