//! Subscription lifecycle domain.
//!
//! - `Subscription` - aggregate binding a subscriber to a plan
//! - `SubscriptionStatus` - derived Pending/Active/Finished/Canceled
//! - `SubscriptionEvent` - lifecycle events published after commit
//! - `SubscriptionError` - error type shared by every core operation

mod aggregate;
mod errors;
mod events;
mod options;
mod snapshot;
mod status;

pub use aggregate::Subscription;
pub use errors::{ErrorKind, SubscriptionError};
pub use events::{SubscriptionEvent, SubscriptionState};
pub use options::ChangePlanOptions;
pub use snapshot::{PlanSnapshot, SnapshotFeature};
pub use status::SubscriptionStatus;
