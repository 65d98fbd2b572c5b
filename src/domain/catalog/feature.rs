//! Feature registry entry.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{FeatureId, Timestamp, ValidationError};

/// A named capability or quota dimension that plans can grant.
///
/// `slug` is unique across the registry and is the key callers use when
/// asking about entitlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub slug: String,
    pub sort_order: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Feature {
    /// Creates a feature. The slug is expected to be pre-generated.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        sort_order: i32,
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
        if slug.chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid_format("slug", "must not contain whitespace"));
        }

        Ok(Self {
            id: FeatureId::new(),
            name,
            slug,
            sort_order,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_feature_records_creation_time() {
        let now = Timestamp::from_unix_secs(1_000);
        let feature = Feature::new("Users", "users", 1, now).unwrap();
        assert_eq!(feature.created_at, now);
        assert_eq!(feature.updated_at, now);
        assert!(!feature.is_deleted());
    }

    #[test]
    fn slug_with_spaces_is_rejected() {
        let result = Feature::new("Team Seats", "team seats", 1, Timestamp::now());
        assert!(matches!(result, Err(ValidationError::InvalidFormat { .. })));
    }

    #[test]
    fn empty_name_is_rejected() {
        let result = Feature::new("", "users", 1, Timestamp::now());
        assert_eq!(result, Err(ValidationError::empty_field("name")));
    }
}
