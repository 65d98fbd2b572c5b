//! Usage ledger rows and the activity trail they feed.

mod activity;
mod counter;

pub use activity::{Activity, ActivityChanges};
pub use counter::{Usage, UsageChange, USAGE_ENTITY_TYPE};
