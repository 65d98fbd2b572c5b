//! ActivityLog port - append-only audit trail.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EntityRef};
use crate::domain::usage::Activity;

#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Append outside of a ledger transaction.
    async fn append(&self, activity: &Activity) -> Result<(), DomainError>;

    /// Activities recorded against `subject`, oldest first.
    async fn list_for(&self, subject: &EntityRef) -> Result<Vec<Activity>, DomainError>;

    /// Hard-delete every activity of `subject`. Returns the number removed.
    async fn purge_for(&self, subject: &EntityRef) -> Result<u64, DomainError>;
}
