//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, entity references, events and error
//! types that form the vocabulary of the pricing domain.

mod entity_ref;
mod errors;
mod events;
mod ids;
mod timestamp;

pub use entity_ref::EntityRef;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, SerializableDomainEvent};
pub use ids::{ActivityId, FeatureId, PlanId, SubscriptionId, UsageId};
pub use timestamp::Timestamp;
