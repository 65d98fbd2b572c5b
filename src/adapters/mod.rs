//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-process storage for tests and embedded use
//! - `postgres` - PostgreSQL storage via sqlx
//! - `events` - Event bus implementations
//! - `clock` / `actor` - Context providers
//! - `registry` - Type-tag to resolver map for host entities

pub mod actor;
pub mod clock;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod registry;

pub use actor::FixedActor;
pub use clock::{FixedClock, SystemClock};
pub use events::InMemoryEventBus;
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use registry::{EntityRegistry, StaticResolver};
