//! Derived subscription status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Effective state of a subscription at a point in time.
///
/// Never stored. Computed from `start_at`, `finish_at` and `canceled_at`
/// against the clock. Canceled takes precedence over Finished, and Finished
/// over Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// `start_at` is still in the future.
    Pending,
    Active,
    /// `finish_at` has passed.
    Finished,
    Canceled,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Finished => "finished",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
