//! PlanCatalog port - plans and their feature entitlements.
//!
//! Default queries exclude soft-deleted plans and features.

use async_trait::async_trait;

use crate::domain::catalog::{EntitlementValue, Plan, PlanCadence, PlanFeature};
use crate::domain::foundation::{DomainError, FeatureId, PlanId, Timestamp};

#[async_trait]
pub trait PlanCatalog: Send + Sync {
    /// Find a live plan by id.
    async fn find(&self, id: &PlanId) -> Result<Option<Plan>, DomainError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Plan>, DomainError>;

    /// All live plans ordered by `sort_order`.
    async fn list(&self) -> Result<Vec<Plan>, DomainError>;

    /// Live plans whose (interval, period) match the cadence.
    async fn find_by_cadence(&self, cadence: PlanCadence) -> Result<Vec<Plan>, DomainError>;

    /// Entitlements of a plan ordered by the feature's `sort_order`, then name.
    async fn features_of(&self, plan_id: &PlanId) -> Result<Vec<PlanFeature>, DomainError>;

    /// The plan's entitlement for a feature slug, if the plan grants it.
    async fn entitlement(
        &self,
        plan_id: &PlanId,
        feature_slug: &str,
    ) -> Result<Option<PlanFeature>, DomainError>;

    /// True when a pivot row links the plan to the feature, whatever its value.
    async fn has_feature(&self, plan_id: &PlanId, feature_slug: &str) -> Result<bool, DomainError> {
        Ok(self.entitlement(plan_id, feature_slug).await?.is_some())
    }

    /// Insert or replace a plan.
    ///
    /// # Errors
    ///
    /// - `UniqueViolation` if another plan already uses the slug
    async fn save(&self, plan: &Plan) -> Result<(), DomainError>;

    /// Link a feature to a plan, replacing any existing value.
    ///
    /// # Errors
    ///
    /// - `NotFound` if either side does not exist
    async fn attach_feature(
        &self,
        plan_id: &PlanId,
        feature_id: &FeatureId,
        value: EntitlementValue,
    ) -> Result<(), DomainError>;

    async fn detach_feature(&self, plan_id: &PlanId, feature_id: &FeatureId) -> Result<(), DomainError>;

    /// Soft-delete a plan and remove its pivot rows.
    async fn delete(&self, plan_id: &PlanId, now: Timestamp) -> Result<(), DomainError>;
}
