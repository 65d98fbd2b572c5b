//! Configured value of a (plan, feature) entitlement.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The pivot value attached to a plan's feature.
///
/// Plans mix quota-style entitlements (`"10"`), boolean-style tokens
/// (`"Y"`, `"OK"`) and free text, so the raw string is kept as-is and
/// interpreted on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitlementValue(String);

impl EntitlementValue {
    /// Canonical positive token.
    pub const POSITIVE: &'static str = "Y";

    /// Value reported for features a plan does not include.
    pub const ZERO: &'static str = "0";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn positive() -> Self {
        Self::new(Self::POSITIVE)
    }

    pub fn zero() -> Self {
        Self::new(Self::ZERO)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric interpretation used for quota arithmetic.
    ///
    /// Non-numeric values coerce to 0, which makes remaining-use figures
    /// meaningless for boolean-style entitlements.
    pub fn as_quota(&self) -> i64 {
        self.0.trim().parse::<i64>().unwrap_or(0)
    }

    /// Exact match against the `"0"` sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == Self::ZERO
    }

    /// True when the upper-cased value is one of `tokens`.
    ///
    /// `tokens` must already be upper-cased.
    pub fn is_positive(&self, tokens: &HashSet<String>) -> bool {
        tokens.contains(&self.0.to_uppercase())
    }
}

impl fmt::Display for EntitlementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntitlementValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntitlementValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_tokens() -> HashSet<String> {
        ["Y", "OK", "TRUE"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_values_are_quotas() {
        assert_eq!(EntitlementValue::new("10").as_quota(), 10);
        assert_eq!(EntitlementValue::new(" 25 ").as_quota(), 25);
    }

    #[test]
    fn non_numeric_values_coerce_to_zero() {
        assert_eq!(EntitlementValue::positive().as_quota(), 0);
        assert_eq!(EntitlementValue::new("unlimited").as_quota(), 0);
    }

    #[test]
    fn positive_check_is_case_insensitive() {
        let tokens = default_tokens();
        assert!(EntitlementValue::new("y").is_positive(&tokens));
        assert!(EntitlementValue::new("True").is_positive(&tokens));
        assert!(EntitlementValue::new("ok").is_positive(&tokens));
        assert!(!EntitlementValue::new("not-positive").is_positive(&tokens));
        assert!(!EntitlementValue::new("10").is_positive(&tokens));
    }

    #[test]
    fn zero_sentinel_is_exact() {
        assert!(EntitlementValue::zero().is_zero());
        assert!(!EntitlementValue::new("00").is_zero());
        assert!(!EntitlementValue::new("N").is_zero());
    }
}
