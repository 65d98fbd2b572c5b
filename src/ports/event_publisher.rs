//! EventPublisher port - where lifecycle events go after commit.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing domain events.
///
/// Services publish only after the owning transaction has committed, so a
/// publish failure never rolls back state. Callers log it and move on.
///
/// # Example
///
/// ```ignore
/// let envelope = SubscriptionEvent::Canceled(state).to_envelope()?;
/// publisher.publish(envelope).await?;
/// ```
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError>;
}
