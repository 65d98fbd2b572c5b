//! Caller-supplied overrides for a plan change.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, ValidationError};

/// Overrides applied to the subscription created by a plan change.
///
/// Unset fields fall back to: the new plan's name, `start_at = now`,
/// `finish_at = None` (recurrent) and the old subscription's due day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePlanOptions {
    pub name: Option<String>,
    pub due_day: Option<u8>,
    pub start_at: Option<Timestamp>,
    pub finish_at: Option<Timestamp>,
}

impl ChangePlanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn due_day(mut self, day: u8) -> Self {
        self.due_day = Some(day);
        self
    }

    pub fn start_at(mut self, at: Timestamp) -> Self {
        self.start_at = Some(at);
        self
    }

    pub fn finish_at(mut self, at: Timestamp) -> Self {
        self.finish_at = Some(at);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::empty_field("name"));
            }
        }
        if let Some(day) = self.due_day {
            if !(1..=31).contains(&day) {
                return Err(ValidationError::out_of_range("due_day", 1, 31, i64::from(day)));
            }
        }
        if let (Some(start), Some(finish)) = (self.start_at, self.finish_at) {
            if finish <= start {
                return Err(ValidationError::invalid_format(
                    "finish_at",
                    "must be after start_at",
                ));
            }
        }
        Ok(())
    }
}
