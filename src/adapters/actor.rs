//! Actor context adapters.

use crate::domain::foundation::EntityRef;
use crate::ports::ActorContext;

/// Actor context with a fixed answer, for hosts that resolve the caller
/// before building the engine (one engine per request) and for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedActor {
    actor: Option<EntityRef>,
}

impl FixedActor {
    pub fn authenticated(actor: EntityRef) -> Self {
        Self { actor: Some(actor) }
    }

    pub fn anonymous() -> Self {
        Self { actor: None }
    }
}

impl ActorContext for FixedActor {
    fn current_actor(&self) -> Option<EntityRef> {
        self.actor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_actor() {
        assert_eq!(FixedActor::anonymous().current_actor(), None);
    }

    #[test]
    fn authenticated_returns_actor() {
        let user = EntityRef::new("User", "42").unwrap();
        assert_eq!(FixedActor::authenticated(user.clone()).current_actor(), Some(user));
    }
}
