//! Application layer - Handlers and the per-subscriber facade.
//!
//! Handlers orchestrate domain operations over the ports. [`PricingEngine`]
//! wires them together and [`Subscribable`] exposes them per subscriber.

pub mod handlers;
pub mod subscribable;

pub use handlers::{
    ChangePlanCommand, ChangePlanHandler, ChangePlanResult, EntitlementEvaluator,
    SubscriptionLifecycle, UsageLedger,
};
pub use subscribable::{PricingEngine, PricingStore, Subscribable, SubscriberHandle};
