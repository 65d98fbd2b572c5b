//! Plan aggregate and billing cadence.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{PlanId, Timestamp, ValidationError};

use super::{EntitlementValue, Feature};

/// Unit of a plan's billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingInterval {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "month" => Ok(BillingInterval::Month),
            "year" => Ok(BillingInterval::Year),
            other => Err(ValidationError::invalid_format(
                "interval",
                format!("unknown billing interval '{}'", other),
            )),
        }
    }
}

/// Named cadence filters over (interval, period).
///
/// Yearly is encoded as twelve monthly periods, not as a `Year` interval.
/// Stored catalogs depend on that encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanCadence {
    Monthly,
    Yearly,
}

impl PlanCadence {
    /// The (interval, period) pair a plan must carry to match this cadence.
    pub fn interval_and_period(&self) -> (BillingInterval, u32) {
        match self {
            PlanCadence::Monthly => (BillingInterval::Month, 1),
            PlanCadence::Yearly => (BillingInterval::Month, 12),
        }
    }

    pub fn matches(&self, plan: &Plan) -> bool {
        let (interval, period) = self.interval_and_period();
        plan.interval == interval && plan.period == period
    }
}

/// A priced bundle of feature entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Minor currency units.
    pub price: i64,
    pub interval: BillingInterval,
    pub period: u32,
    pub trial_period_days: u32,
    pub sort_order: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Plan {
    /// Creates a plan billed every `period` `interval`s.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        price: i64,
        interval: BillingInterval,
        period: u32,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let slug = slug.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if slug.trim().is_empty() {
            return Err(ValidationError::empty_field("slug"));
        }
        if price < 0 {
            return Err(ValidationError::out_of_range("price", 0, i64::MAX, price));
        }
        if period == 0 {
            return Err(ValidationError::out_of_range("period", 1, i64::from(u32::MAX), 0));
        }

        Ok(Self {
            id: PlanId::new(),
            name,
            slug,
            description: None,
            price,
            interval,
            period,
            trial_period_days: 0,
            sort_order: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Shorthand for a plan matching one of the named cadences.
    pub fn with_cadence(
        name: impl Into<String>,
        slug: impl Into<String>,
        price: i64,
        cadence: PlanCadence,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let (interval, period) = cadence.interval_and_period();
        Self::new(name, slug, price, interval, period, now)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_period_days = days;
        self
    }

    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn is_monthly(&self) -> bool {
        PlanCadence::Monthly.matches(self)
    }

    pub fn is_yearly(&self) -> bool {
        PlanCadence::Yearly.matches(self)
    }

    pub fn has_trial(&self) -> bool {
        self.trial_period_days > 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// End of one billing cycle starting at `from`.
    ///
    /// Returns `None` when the result falls outside the representable range.
    pub fn cycle_end(&self, from: Timestamp) -> Option<Timestamp> {
        match self.interval {
            BillingInterval::Month => from.checked_add_months(self.period),
            BillingInterval::Year => from.checked_add_years(self.period),
        }
    }
}

/// A feature together with the value a plan grants for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    pub feature: Feature,
    pub value: EntitlementValue,
}

impl PlanFeature {
    pub fn new(feature: Feature, value: impl Into<EntitlementValue>) -> Self {
        Self {
            feature,
            value: value.into(),
        }
    }
}
