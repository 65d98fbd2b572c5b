//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod change_plan;
pub mod evaluator;
pub mod lifecycle;
mod shared;
pub mod usage_ledger;

pub use change_plan::{ChangePlanCommand, ChangePlanHandler, ChangePlanResult};
pub use evaluator::EntitlementEvaluator;
pub use lifecycle::SubscriptionLifecycle;
pub use usage_ledger::UsageLedger;
