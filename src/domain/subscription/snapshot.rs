//! Point-in-time copy of a plan taken at subscribe time.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::{BillingInterval, EntitlementValue, Plan, PlanFeature};
use crate::domain::foundation::{PlanId, Timestamp};

/// Entitlement line inside a [`PlanSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFeature {
    pub slug: String,
    pub name: String,
    pub value: EntitlementValue,
}

/// Frozen view of a plan and its entitlements.
///
/// Later edits to the catalog do not touch snapshots already stored on a
/// subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: PlanId,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub interval: BillingInterval,
    pub period: u32,
    pub trial_period_days: u32,
    pub features: Vec<SnapshotFeature>,
    pub taken_at: Timestamp,
}

impl PlanSnapshot {
    pub fn capture(plan: &Plan, features: &[PlanFeature], taken_at: Timestamp) -> Self {
        Self {
            plan_id: plan.id,
            name: plan.name.clone(),
            slug: plan.slug.clone(),
            price: plan.price,
            interval: plan.interval,
            period: plan.period,
            trial_period_days: plan.trial_period_days,
            features: features
                .iter()
                .map(|pf| SnapshotFeature {
                    slug: pf.feature.slug.clone(),
                    name: pf.feature.name.clone(),
                    value: pf.value.clone(),
                })
                .collect(),
            taken_at,
        }
    }

    pub fn value_of(&self, slug: &str) -> Option<&EntitlementValue> {
        self.features.iter().find(|f| f.slug == slug).map(|f| &f.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Feature, PlanCadence};

    #[test]
    fn snapshot_is_detached_from_later_plan_edits() {
        let now = Timestamp::from_unix_secs(100);
        let mut plan = Plan::with_cadence("Basic", "basic", 900, PlanCadence::Monthly, now).unwrap();
        let users = Feature::new("Users", "users", 1, now).unwrap();
        let features = vec![PlanFeature::new(users, "10")];

        let snapshot = PlanSnapshot::capture(&plan, &features, now);
        plan.price = 1_900;

        assert_eq!(snapshot.price, 900);
        assert_eq!(snapshot.value_of("users").map(|v| v.as_str()), Some("10"));
        assert_eq!(snapshot.value_of("seats"), None);
    }
}
