//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `PlanCatalog` - Plans and their feature entitlements
//! - `FeatureRegistry` - Canonical feature list
//! - `SubscriptionRepository` - Subscriptions per subscriber
//! - `UsageReader` - Non-transactional ledger reads
//! - `ActivityLog` - Append-only audit trail
//! - `UnitOfWork` / `StoreTransaction` - Atomic ledger and plan-change writes
//!
//! ## Context Ports
//!
//! - `Clock` - Current time
//! - `ActorContext` - Acting entity for activity attribution
//! - `EntityResolver` - Host entity lookup per type tag
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Post-commit delivery of lifecycle events
//! - `EventSubscriber` / `EventHandler` - Handler registration

mod activity_log;
mod actor_context;
mod clock;
mod entity_resolver;
mod event_publisher;
mod event_subscriber;
mod feature_registry;
mod plan_catalog;
mod subscription_repository;
mod unit_of_work;
mod usage_reader;

pub use activity_log::ActivityLog;
pub use actor_context::ActorContext;
pub use clock::Clock;
pub use entity_resolver::EntityResolver;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventHandler, EventSubscriber};
pub use feature_registry::FeatureRegistry;
pub use plan_catalog::PlanCatalog;
pub use subscription_repository::SubscriptionRepository;
pub use unit_of_work::{LockMode, StoreTransaction, UnitOfWork};
pub use usage_reader::UsageReader;
