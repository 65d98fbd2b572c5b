//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! One `PostgresStore` backs every storage port over a shared `PgPool`.
//! Ledger mutations and plan changes run through `PostgresTransaction`,
//! which locks usage rows with `SELECT ... FOR UPDATE`.

mod rows;
mod store;
mod transaction;

pub use store::PostgresStore;
pub use transaction::PostgresTransaction;
