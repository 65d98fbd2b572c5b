//! EntityResolver port - lookup of host-owned entities by id.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

/// Resolves ids for one entity type of the host application.
///
/// Registered per type tag so polymorphic references (`Account:42`,
/// `Workspace:7`) can be checked without a shared base type.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn exists(&self, entity_id: &str) -> Result<bool, DomainError>;
}
