//! Event bus adapters.
//!
//! - `InMemoryEventBus` - In-process capture and fan-out of lifecycle events

mod in_memory;

pub use in_memory::InMemoryEventBus;
