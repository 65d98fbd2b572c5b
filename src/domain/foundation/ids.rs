//! Strongly-typed identifier value objects.
//!
//! Every persisted record is keyed by a UUID. Each record kind gets its own
//! newtype so a `FeatureId` can never be passed where a `PlanId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a plan in the catalog.
    PlanId
);

uuid_id!(
    /// Identifier of a feature in the registry.
    FeatureId
);

uuid_id!(
    /// Identifier of a subscriber-plan binding.
    SubscriptionId
);

uuid_id!(
    /// Identifier of a (subscription, feature) ledger row.
    UsageId
);

uuid_id!(
    /// Identifier of an audit record.
    ActivityId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_id_generates_unique_values() {
        assert_ne!(PlanId::new(), PlanId::new());
    }

    #[test]
    fn subscription_id_parses_from_valid_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: SubscriptionId = uuid_str.parse().unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn feature_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<FeatureId>().is_err());
    }

    #[test]
    fn usage_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(UsageId::from_uuid(uuid).as_uuid(), &uuid);
    }

    #[test]
    fn activity_id_serializes_transparently() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: ActivityId = uuid_str.parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid_str));
    }
}
