//! EventSubscriber port - handlers registering for lifecycle events.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing domain events.
///
/// Handlers run after the owning write has committed. A failing handler is
/// logged by the bus and does not stop the others.
///
/// # Example
///
/// ```ignore
/// struct BillingNotifier { /* ... */ }
///
/// #[async_trait]
/// impl EventHandler for BillingNotifier {
///     async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
///         let event: SubscriptionEvent = event.payload_as()?;
///         // Schedule the next invoice...
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "BillingNotifier"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to domain events by event type.
///
/// ```ignore
/// subscriber.subscribe("subscription.canceled.v1", notifier);
/// subscriber.subscribe_all(&["subscription.created.v1", "subscription.plan_changed.v1"], billing);
/// ```
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}
