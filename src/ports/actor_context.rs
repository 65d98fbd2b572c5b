//! ActorContext port - who is making the current call.

use crate::domain::foundation::EntityRef;

/// Supplies the acting entity recorded as the causer of activities.
///
/// Returning `None` means no actor is authenticated. Operations that write
/// to the activity trail fail with a precondition error in that case; they
/// never substitute a default.
pub trait ActorContext: Send + Sync {
    fn current_actor(&self) -> Option<EntityRef>;
}
