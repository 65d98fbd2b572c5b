//! PostgreSQL implementation of the storage ports.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::catalog::{EntitlementValue, Feature, Plan, PlanCadence, PlanFeature};
use crate::domain::foundation::{
    DomainError, EntityRef, ErrorCode, FeatureId, PlanId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::Subscription;
use crate::domain::usage::{Activity, Usage};
use crate::ports::{
    ActivityLog, FeatureRegistry, PlanCatalog, StoreTransaction, SubscriptionRepository,
    UnitOfWork, UsageReader,
};

use super::rows::{
    db_error, dt, opt_dt, snapshot_json, to_i32, ActivityRow, FeatureRow, PlanFeatureRow,
    PlanRow, SubscriptionRow, UsageRow, ACTIVITY_COLUMNS, FEATURE_COLUMNS, PLAN_COLUMNS,
    SUBSCRIPTION_COLUMNS, USAGE_COLUMNS,
};
use super::transaction::{
    insert_activity_row, insert_subscription_row, soft_delete_subscription_rows,
    PostgresTransaction,
};

/// Newest first. Equal timestamps fall back to insertion order.
const NEWEST_SUBSCRIPTION_FIRST: &str = "ORDER BY created_at DESC, seq DESC";

/// Every storage port over one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool sized and timed by `config`, running migrations if asked.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(db_error("connect"))?;

        let store = Self::new(pool);
        if config.run_migrations {
            store.migrate().await?;
        }
        tracing::info!(
            pool_size = config.pool_size,
            "Connected to PostgreSQL"
        );
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("migrate: {}", e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_tx(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, DomainError> {
        self.pool.begin().await.map_err(db_error("begin transaction"))
    }
}

fn not_found(entity: &str, key: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::NotFound, format!("{} {} not found", entity, key))
}

// ============================================================
// Catalog
// ============================================================

#[async_trait]
impl PlanCatalog for PostgresStore {
    async fn find(&self, id: &PlanId) -> Result<Option<Plan>, DomainError> {
        let sql = format!("SELECT {} FROM plans WHERE id = $1 AND deleted_at IS NULL", PLAN_COLUMNS);
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find plan"))?;
        row.map(Plan::try_from).transpose()
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Plan>, DomainError> {
        let sql = format!("SELECT {} FROM plans WHERE slug = $1 AND deleted_at IS NULL", PLAN_COLUMNS);
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find plan by slug"))?;
        row.map(Plan::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Plan>, DomainError> {
        let sql = format!(
            "SELECT {} FROM plans WHERE deleted_at IS NULL ORDER BY sort_order, name",
            PLAN_COLUMNS
        );
        let rows: Vec<PlanRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list plans"))?;
        rows.into_iter().map(Plan::try_from).collect()
    }

    async fn find_by_cadence(&self, cadence: PlanCadence) -> Result<Vec<Plan>, DomainError> {
        let (interval, period) = cadence.interval_and_period();
        let sql = format!(
            r#"SELECT {} FROM plans
               WHERE "interval" = $1 AND period = $2 AND deleted_at IS NULL
               ORDER BY sort_order, name"#,
            PLAN_COLUMNS
        );
        let rows: Vec<PlanRow> = sqlx::query_as(&sql)
            .bind(interval.as_str())
            .bind(to_i32("period", period)?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("find plans by cadence"))?;
        rows.into_iter().map(Plan::try_from).collect()
    }

    async fn features_of(&self, plan_id: &PlanId) -> Result<Vec<PlanFeature>, DomainError> {
        let rows: Vec<PlanFeatureRow> = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.slug, f.sort_order, f.created_at, f.updated_at, f.deleted_at, pf.value
            FROM plan_features pf
            JOIN features f ON f.id = pf.feature_id
            WHERE pf.plan_id = $1 AND f.deleted_at IS NULL
            ORDER BY f.sort_order, f.name
            "#,
        )
        .bind(plan_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list plan features"))?;
        Ok(rows.into_iter().map(PlanFeature::from).collect())
    }

    async fn entitlement(
        &self,
        plan_id: &PlanId,
        feature_slug: &str,
    ) -> Result<Option<PlanFeature>, DomainError> {
        let row: Option<PlanFeatureRow> = sqlx::query_as(
            r#"
            SELECT f.id, f.name, f.slug, f.sort_order, f.created_at, f.updated_at, f.deleted_at, pf.value
            FROM plan_features pf
            JOIN features f ON f.id = pf.feature_id
            WHERE pf.plan_id = $1 AND f.slug = $2 AND f.deleted_at IS NULL
            "#,
        )
        .bind(plan_id.as_uuid())
        .bind(feature_slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("find entitlement"))?;
        Ok(row.map(PlanFeature::from))
    }

    async fn save(&self, plan: &Plan) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plans (
                id, name, slug, description, price, "interval", period,
                trial_period_days, sort_order, created_at, updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                "interval" = EXCLUDED."interval",
                period = EXCLUDED.period,
                trial_period_days = EXCLUDED.trial_period_days,
                sort_order = EXCLUDED.sort_order,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(plan.id.as_uuid())
        .bind(&plan.name)
        .bind(&plan.slug)
        .bind(&plan.description)
        .bind(plan.price)
        .bind(plan.interval.as_str())
        .bind(to_i32("period", plan.period)?)
        .bind(to_i32("trial_period_days", plan.trial_period_days)?)
        .bind(plan.sort_order)
        .bind(dt(plan.created_at))
        .bind(dt(plan.updated_at))
        .bind(opt_dt(plan.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("save plan"))?;
        Ok(())
    }

    async fn attach_feature(
        &self,
        plan_id: &PlanId,
        feature_id: &FeatureId,
        value: EntitlementValue,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO plan_features (plan_id, feature_id, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (plan_id, feature_id) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(plan_id.as_uuid())
        .bind(feature_id.as_uuid())
        .bind(value.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("attach feature"))?;
        Ok(())
    }

    async fn detach_feature(&self, plan_id: &PlanId, feature_id: &FeatureId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM plan_features WHERE plan_id = $1 AND feature_id = $2")
            .bind(plan_id.as_uuid())
            .bind(feature_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error("detach feature"))?;
        Ok(())
    }

    async fn delete(&self, plan_id: &PlanId, now: Timestamp) -> Result<(), DomainError> {
        let mut tx = self.begin_tx().await?;

        let result = sqlx::query(
            "UPDATE plans SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(plan_id.as_uuid())
        .bind(dt(now))
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete plan"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("plan", plan_id));
        }

        sqlx::query("DELETE FROM plan_features WHERE plan_id = $1")
            .bind(plan_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete plan features"))?;

        tx.commit().await.map_err(db_error("commit transaction"))
    }
}

#[async_trait]
impl FeatureRegistry for PostgresStore {
    async fn find_by_id(&self, id: &FeatureId) -> Result<Option<Feature>, DomainError> {
        let sql = format!("SELECT {} FROM features WHERE id = $1 AND deleted_at IS NULL", FEATURE_COLUMNS);
        let row: Option<FeatureRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find feature"))?;
        Ok(row.map(Feature::from))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Feature>, DomainError> {
        let sql = format!("SELECT {} FROM features WHERE slug = $1 AND deleted_at IS NULL", FEATURE_COLUMNS);
        let row: Option<FeatureRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find feature by slug"))?;
        Ok(row.map(Feature::from))
    }

    async fn list(&self) -> Result<Vec<Feature>, DomainError> {
        let sql = format!(
            "SELECT {} FROM features WHERE deleted_at IS NULL ORDER BY sort_order, name",
            FEATURE_COLUMNS
        );
        let rows: Vec<FeatureRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list features"))?;
        Ok(rows.into_iter().map(Feature::from).collect())
    }

    async fn save(&self, feature: &Feature) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO features (id, name, slug, sort_order, created_at, updated_at, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                sort_order = EXCLUDED.sort_order,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(feature.id.as_uuid())
        .bind(&feature.name)
        .bind(&feature.slug)
        .bind(feature.sort_order)
        .bind(dt(feature.created_at))
        .bind(dt(feature.updated_at))
        .bind(opt_dt(feature.deleted_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("save feature"))?;
        Ok(())
    }

    async fn delete(&self, id: &FeatureId, now: Timestamp) -> Result<(), DomainError> {
        let mut tx = self.begin_tx().await?;

        let result = sqlx::query(
            "UPDATE features SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(dt(now))
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete feature"))?;
        if result.rows_affected() == 0 {
            return Err(not_found("feature", id));
        }

        sqlx::query("DELETE FROM plan_features WHERE feature_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete feature pivots"))?;

        sqlx::query(
            "UPDATE usages SET deleted_at = $2, updated_at = $2 WHERE feature_id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .bind(dt(now))
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete feature usages"))?;

        tx.commit().await.map_err(db_error("commit transaction"))
    }
}

// ============================================================
// Subscriptions
// ============================================================

#[async_trait]
impl SubscriptionRepository for PostgresStore {
    async fn latest_for(&self, subscriber: &EntityRef) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            r#"SELECT {} FROM subscriptions
               WHERE subscriber_type = $1 AND subscriber_id = $2 AND deleted_at IS NULL
               {} LIMIT 1"#,
            SUBSCRIPTION_COLUMNS, NEWEST_SUBSCRIPTION_FIRST
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscriber.entity_type())
            .bind(subscriber.entity_id())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find latest subscription"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn latest_active_for(
        &self,
        subscriber: &EntityRef,
        now: Timestamp,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            r#"SELECT {} FROM subscriptions
               WHERE subscriber_type = $1 AND subscriber_id = $2 AND deleted_at IS NULL
                 AND start_at <= $3
                 AND (finish_at IS NULL OR finish_at > $3)
                 AND canceled_at IS NULL
               {} LIMIT 1"#,
            SUBSCRIPTION_COLUMNS, NEWEST_SUBSCRIPTION_FIRST
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscriber.entity_type())
            .bind(subscriber.entity_id())
            .bind(dt(now))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find latest active subscription"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn list_for(&self, subscriber: &EntityRef) -> Result<Vec<Subscription>, DomainError> {
        let sql = format!(
            r#"SELECT {} FROM subscriptions
               WHERE subscriber_type = $1 AND subscriber_id = $2 AND deleted_at IS NULL
               {}"#,
            SUBSCRIPTION_COLUMNS, NEWEST_SUBSCRIPTION_FIRST
        );
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(subscriber.entity_type())
            .bind(subscriber.entity_id())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list subscriptions"))?;
        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE id = $1 AND deleted_at IS NULL",
            SUBSCRIPTION_COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find subscription"))?;
        row.map(Subscription::try_from).transpose()
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(db_error("acquire connection"))?;
        insert_subscription_row(&mut *conn, subscription).await
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan_id = $2, name = $3, slug = $4, start_at = $5, finish_at = $6,
                canceled_at = $7, due_day = $8, immutable_plan = $9, updated_at = $10
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(&subscription.name)
        .bind(&subscription.slug)
        .bind(dt(subscription.start_at))
        .bind(opt_dt(subscription.finish_at))
        .bind(opt_dt(subscription.canceled_at))
        .bind(subscription.due_day.map(i16::from))
        .bind(snapshot_json(subscription)?)
        .bind(dt(subscription.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("update subscription"))?;

        if result.rows_affected() == 0 {
            return Err(not_found("subscription", subscription.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &SubscriptionId, now: Timestamp) -> Result<(), DomainError> {
        let mut tx = self.begin_tx().await?;
        soft_delete_subscription_rows(&mut *tx, id, now).await?;
        tx.commit().await.map_err(db_error("commit transaction"))
    }
}

// ============================================================
// Ledger
// ============================================================

#[async_trait]
impl UsageReader for PostgresStore {
    async fn find(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<Option<Usage>, DomainError> {
        let sql = format!(
            "SELECT {} FROM usages WHERE subscription_id = $1 AND feature_id = $2 AND deleted_at IS NULL",
            USAGE_COLUMNS
        );
        let row: Option<UsageRow> = sqlx::query_as(&sql)
            .bind(subscription_id.as_uuid())
            .bind(feature_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find usage"))?;
        row.map(Usage::try_from).transpose()
    }

    async fn consumed(
        &self,
        subscription_id: &SubscriptionId,
        feature_id: &FeatureId,
    ) -> Result<u64, DomainError> {
        let (sum,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(used), 0)::BIGINT FROM usages
            WHERE subscription_id = $1 AND feature_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(feature_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("sum usage"))?;

        u64::try_from(sum).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid used sum: {}", e))
        })
    }

    async fn list_for(&self, subscription_id: &SubscriptionId) -> Result<Vec<Usage>, DomainError> {
        let sql = format!(
            "SELECT {} FROM usages WHERE subscription_id = $1 AND deleted_at IS NULL ORDER BY created_at",
            USAGE_COLUMNS
        );
        let rows: Vec<UsageRow> = sqlx::query_as(&sql)
            .bind(subscription_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list usages"))?;
        rows.into_iter().map(Usage::try_from).collect()
    }
}

#[async_trait]
impl ActivityLog for PostgresStore {
    async fn append(&self, activity: &Activity) -> Result<(), DomainError> {
        let mut conn = self.pool.acquire().await.map_err(db_error("acquire connection"))?;
        insert_activity_row(&mut *conn, activity).await
    }

    async fn list_for(&self, subject: &EntityRef) -> Result<Vec<Activity>, DomainError> {
        let sql = format!(
            "SELECT {} FROM activities WHERE subject_type = $1 AND subject_id = $2 ORDER BY created_at",
            ACTIVITY_COLUMNS
        );
        let rows: Vec<ActivityRow> = sqlx::query_as(&sql)
            .bind(subject.entity_type())
            .bind(subject.entity_id())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list activities"))?;
        rows.into_iter().map(Activity::try_from).collect()
    }

    async fn purge_for(&self, subject: &EntityRef) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM activities WHERE subject_type = $1 AND subject_id = $2")
            .bind(subject.entity_type())
            .bind(subject.entity_id())
            .execute(&self.pool)
            .await
            .map_err(db_error("purge activities"))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        Ok(Box::new(PostgresTransaction::new(self.begin_tx().await?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../../../migrations/0001_create_pricing_tables.sql");

    #[test]
    fn subscription_ordering_has_insertion_tie_break() {
        assert!(NEWEST_SUBSCRIPTION_FIRST.ends_with(", seq DESC"));
        assert!(SCHEMA.contains("seq             BIGINT GENERATED ALWAYS AS IDENTITY"));
    }
}
