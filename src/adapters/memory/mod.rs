//! In-memory storage adapter.
//!
//! - `InMemoryStore` - implements every storage port over shared tables
//! - `InMemoryTransaction` - copy-on-begin, swap-on-commit transaction

mod store;
mod tables;
mod transaction;

pub use store::InMemoryStore;
pub use transaction::InMemoryTransaction;
