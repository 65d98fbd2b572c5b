//! PostgreSQL unit of work.

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction};

use crate::domain::foundation::{DomainError, ErrorCode, FeatureId, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};
use crate::ports::{LockMode, StoreTransaction};

use super::rows::{
    changes_json, db_error, dt, metadata_json, opt_dt, snapshot_json, to_i64, SubscriptionRow,
    UsageRow, SUBSCRIPTION_COLUMNS, USAGE_COLUMNS,
};

/// A database transaction. Rolled back by sqlx when dropped uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub(super) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

// ============================================================
// Statements shared with the pool-backed store
// ============================================================

pub(super) async fn insert_subscription_row(
    conn: &mut PgConnection,
    subscription: &Subscription,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            id, subscriber_type, subscriber_id, plan_id, name, slug,
            start_at, finish_at, canceled_at, due_day, immutable_plan,
            created_at, updated_at, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.subscriber.entity_type())
    .bind(subscription.subscriber.entity_id())
    .bind(subscription.plan_id.as_uuid())
    .bind(&subscription.name)
    .bind(&subscription.slug)
    .bind(dt(subscription.start_at))
    .bind(opt_dt(subscription.finish_at))
    .bind(opt_dt(subscription.canceled_at))
    .bind(subscription.due_day.map(i16::from))
    .bind(snapshot_json(subscription)?)
    .bind(dt(subscription.created_at))
    .bind(dt(subscription.updated_at))
    .bind(opt_dt(subscription.deleted_at))
    .execute(conn)
    .await
    .map_err(db_error("insert subscription"))?;
    Ok(())
}

pub(super) async fn soft_delete_subscription_rows(
    conn: &mut PgConnection,
    id: &SubscriptionId,
    now: Timestamp,
) -> Result<(), DomainError> {
    let result = sqlx::query(
        "UPDATE subscriptions SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id.as_uuid())
    .bind(dt(now))
    .execute(&mut *conn)
    .await
    .map_err(db_error("delete subscription"))?;

    if result.rows_affected() == 0 {
        return Err(DomainError::new(
            ErrorCode::NotFound,
            format!("subscription {} not found", id),
        ));
    }

    sqlx::query(
        "UPDATE usages SET deleted_at = $2, updated_at = $2 WHERE subscription_id = $1 AND deleted_at IS NULL",
    )
    .bind(id.as_uuid())
    .bind(dt(now))
    .execute(&mut *conn)
    .await
    .map_err(db_error("delete subscription usages"))?;
    Ok(())
}

pub(super) async fn insert_activity_row(
    conn: &mut PgConnection,
    activity: &Activity,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO activities (
            id, description, changes, subject_type, subject_id,
            causer_type, causer_id, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(activity.id.as_uuid())
    .bind(&activity.description)
    .bind(changes_json(activity)?)
    .bind(activity.subject.entity_type())
    .bind(activity.subject.entity_id())
    .bind(activity.causer.entity_type())
    .bind(activity.causer.entity_id())
    .bind(dt(activity.created_at))
    .execute(conn)
    .await
    .map_err(db_error("insert activity"))?;
    Ok(())
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn lock_subscription(
        &mut self,
        id: &SubscriptionId,
        mode: LockMode,
    ) -> Result<Option<Subscription>, DomainError> {
        let lock = match mode {
            LockMode::Shared => "FOR SHARE",
            LockMode::Exclusive => "FOR UPDATE",
        };
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE id = $1 AND deleted_at IS NULL {}",
            SUBSCRIPTION_COLUMNS, lock
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("lock subscription"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn lock_usage(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError> {
        let sql = format!(
            "SELECT {} FROM usages WHERE subscription_id = $1 AND feature_id = $2 AND deleted_at IS NULL FOR UPDATE",
            USAGE_COLUMNS
        );
        let row: Option<UsageRow> = sqlx::query_as(&sql)
            .bind(subscription_id.as_uuid())
            .bind(feature_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("lock usage"))?;
        row.map(Usage::try_from).transpose()
    }

    async fn insert_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        // A concurrent insert of the same pair reports a unique violation
        // without aborting the transaction, so the caller can re-lock.
        let result = sqlx::query(
            r#"
            INSERT INTO usages (
                id, subscription_id, feature_id, used, metadata,
                created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (feature_id, subscription_id) WHERE deleted_at IS NULL DO NOTHING
            "#,
        )
        .bind(usage.id.as_uuid())
        .bind(usage.subscription_id.as_uuid())
        .bind(usage.feature_id.as_uuid())
        .bind(to_i64("used", usage.used)?)
        .bind(metadata_json(usage))
        .bind(dt(usage.created_at))
        .bind(dt(usage.updated_at))
        .bind(opt_dt(usage.deleted_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("insert usage"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::unique_violation("usages_feature_id_subscription_id_key"));
        }
        Ok(())
    }

    async fn update_usage(&mut self, usage: &Usage) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE usages SET used = $2, metadata = $3, updated_at = $4, deleted_at = $5 WHERE id = $1",
        )
        .bind(usage.id.as_uuid())
        .bind(to_i64("used", usage.used)?)
        .bind(metadata_json(usage))
        .bind(dt(usage.updated_at))
        .bind(opt_dt(usage.deleted_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("update usage"))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::NotFound,
                format!("usage {} not found", usage.id),
            ));
        }
        Ok(())
    }

    async fn usages_of(&mut self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError> {
        let sql = format!(
            "SELECT {} FROM usages WHERE subscription_id = $1 AND deleted_at IS NULL ORDER BY created_at FOR UPDATE",
            USAGE_COLUMNS
        );
        let rows: Vec<UsageRow> = sqlx::query_as(&sql)
            .bind(subscription_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error("list usages"))?;
        rows.into_iter().map(Usage::try_from).collect()
    }

    async fn soft_delete_usages(
        &mut self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
        now: Timestamp,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE usages SET deleted_at = $3, updated_at = $3
            WHERE subscription_id = $1 AND feature_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(feature_id.as_uuid())
        .bind(dt(now))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("clean usages"))?;
        Ok(result.rows_affected())
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), DomainError> {
        insert_activity_row(&mut *self.tx, activity).await
    }

    async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<(), DomainError> {
        insert_subscription_row(&mut *self.tx, subscription).await
    }

    async fn soft_delete_subscription(
        &mut self,
        id: &SubscriptionId,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        soft_delete_subscription_rows(&mut *self.tx, id, now).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .commit()
            .await
            .map_err(db_error("commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx
            .rollback()
            .await
            .map_err(db_error("rollback transaction"))
    }
}
