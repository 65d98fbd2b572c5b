//! FeatureRegistry port - canonical list of features.

use async_trait::async_trait;

use crate::domain::catalog::Feature;
use crate::domain::foundation::{DomainError, FeatureId, Timestamp};

#[async_trait]
pub trait FeatureRegistry: Send + Sync {
    async fn find_by_id(&self, id: &FeatureId) -> Result<Option<Feature>, DomainError>;

    /// Primary lookup; callers address features by slug.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Feature>, DomainError>;

    /// Live features ordered by `sort_order`, then name.
    async fn list(&self) -> Result<Vec<Feature>, DomainError>;

    /// Insert or replace a feature.
    ///
    /// # Errors
    ///
    /// - `UniqueViolation` if another feature already uses the slug
    async fn save(&self, feature: &Feature) -> Result<(), DomainError>;

    /// Soft-delete a feature, remove its pivot rows and soft-delete its usages.
    async fn delete(&self, id: &FeatureId, now: Timestamp) -> Result<(), DomainError>;
}
