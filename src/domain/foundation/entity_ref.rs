//! Polymorphic entity references.
//!
//! Subscribers (accounts, workspaces, ...) and activity causers (users, API
//! clients, ...) live in the host application. The engine only ever holds a
//! tagged reference to them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Tagged reference `{entity_type, entity_id}` to a host-owned entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    entity_type: String,
    entity_id: String,
}

impl EntityRef {
    /// Creates a reference, rejecting empty tags or ids.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        if entity_type.trim().is_empty() {
            return Err(ValidationError::empty_field("entity_type"));
        }
        if entity_id.trim().is_empty() {
            return Err(ValidationError::empty_field("entity_id"));
        }
        Ok(Self {
            entity_type,
            entity_id,
        })
    }

    /// Reference to a record owned by the engine itself, whose id is never blank.
    pub(crate) fn for_record(entity_type: &'static str, entity_id: impl fmt::Display) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }

    /// The type tag (e.g. `"Account"`).
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// The host-side identifier.
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}
