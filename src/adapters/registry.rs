//! Entity registry - maps type tags to host resolvers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EntityRef, ErrorCode};
use crate::ports::EntityResolver;

/// Resolvers for the host's subscriber and causer types, keyed by type tag.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    resolvers: HashMap<String, Arc<dyn EntityResolver>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver, replacing any previous one for the tag.
    pub fn register(
        mut self,
        entity_type: impl Into<String>,
        resolver: Arc<dyn EntityResolver>,
    ) -> Self {
        self.resolvers.insert(entity_type.into(), resolver);
        self
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.resolvers.contains_key(entity_type)
    }

    /// Whether the referenced entity exists.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no resolver is registered for the reference's type
    pub async fn exists(&self, entity: &EntityRef) -> Result<bool, DomainError> {
        let resolver = self.resolvers.get(entity.entity_type()).ok_or_else(|| {
            DomainError::new(
                ErrorCode::NotFound,
                format!("No resolver registered for entity type {}", entity.entity_type()),
            )
        })?;
        resolver.exists(entity.entity_id()).await
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.resolvers.keys().collect();
        types.sort();
        f.debug_struct("EntityRegistry").field("types", &types).finish()
    }
}

/// Resolver backed by a fixed set of ids.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    ids: std::collections::HashSet<String>,
}

impl StaticResolver {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl EntityResolver for StaticResolver {
    async fn exists(&self, entity_id: &str) -> Result<bool, DomainError> {
        Ok(self.ids.contains(entity_id))
    }
}
