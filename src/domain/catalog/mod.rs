//! Plan catalog and feature registry types.

mod entitlement_value;
mod feature;
mod plan;

pub use entitlement_value::EntitlementValue;
pub use feature::Feature;
pub use plan::{BillingInterval, Plan, PlanCadence, PlanFeature};
