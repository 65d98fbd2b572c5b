//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, entity references, errors, events)
//! - `catalog` - Plans, features and the entitlement values linking them
//! - `subscription` - Subscription aggregate, derived status and lifecycle events
//! - `usage` - Usage ledger rows and the activity trail

pub mod catalog;
pub mod foundation;
pub mod subscription;
pub mod usage;
