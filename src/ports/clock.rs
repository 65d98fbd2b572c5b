//! Clock port - source of "now" for every temporal comparison.

use crate::domain::foundation::Timestamp;

/// Supplies the current time.
///
/// Services never call `Timestamp::now()` directly, so tests can freeze or
/// advance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
