//! Subscription aggregate.
//!
//! A subscription binds one subscriber to one plan over a time window. Its
//! state is never stored; it is derived from `start_at`, `finish_at` and
//! `canceled_at` against the current time.
//!
//! # Invariants
//!
//! - active ⇔ `start_at <= now` and (`finish_at` unset or `finish_at > now`)
//!   and `canceled_at` unset
//! - recurrent ⇔ `finish_at` unset
//! - `start()` is refused once `start_at <= now`

use serde::{Deserialize, Serialize};

use crate::domain::catalog::Plan;
use crate::domain::foundation::{EntityRef, PlanId, SubscriptionId, Timestamp};

use super::{PlanSnapshot, SubscriptionError, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,

    /// Host entity that owns this subscription.
    pub subscriber: EntityRef,

    pub plan_id: PlanId,

    /// Display label, defaults to the plan name.
    pub name: String,
    pub slug: String,

    pub start_at: Timestamp,

    /// `None` means the subscription renews indefinitely.
    pub finish_at: Option<Timestamp>,

    pub canceled_at: Option<Timestamp>,

    /// Day of month billing falls due.
    pub due_day: Option<u8>,

    /// Plan as it was at subscribe time.
    pub immutable_plan: Option<PlanSnapshot>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Subscription {
    /// Creates a recurrent subscription to `plan` starting at `start_at`.
    pub fn new(subscriber: EntityRef, plan: &Plan, start_at: Timestamp, now: Timestamp) -> Self {
        Self {
            id: SubscriptionId::new(),
            subscriber,
            plan_id: plan.id,
            name: plan.name.clone(),
            slug: plan.slug.clone(),
            start_at,
            finish_at: None,
            canceled_at: None,
            due_day: None,
            immutable_plan: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_finish_at(mut self, finish_at: Option<Timestamp>) -> Self {
        self.finish_at = finish_at;
        self
    }

    pub fn with_due_day(mut self, due_day: Option<u8>) -> Self {
        self.due_day = due_day;
        self
    }

    pub fn with_snapshot(mut self, snapshot: PlanSnapshot) -> Self {
        self.immutable_plan = Some(snapshot);
        self
    }

    // ------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------

    pub fn is_started(&self, now: Timestamp) -> bool {
        self.start_at <= now
    }

    pub fn is_finished(&self, now: Timestamp) -> bool {
        self.finish_at.map_or(false, |finish| finish <= now)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.is_started(now) && !self.is_finished(now) && !self.is_canceled()
    }

    pub fn is_recurrent(&self) -> bool {
        self.finish_at.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn status(&self, now: Timestamp) -> SubscriptionStatus {
        if self.is_canceled() {
            SubscriptionStatus::Canceled
        } else if self.is_finished(now) {
            SubscriptionStatus::Finished
        } else if !self.is_started(now) {
            SubscriptionStatus::Pending
        } else {
            SubscriptionStatus::Active
        }
    }

    // ------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------

    /// Moves `start_at` to `now`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the subscription has already started.
    pub fn start(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        if self.is_started(now) {
            return Err(SubscriptionError::invalid_state(
                "start subscription",
                format!("already started at {}", self.start_at),
            ));
        }
        self.start_at = now;
        self.updated_at = now;
        Ok(())
    }

    pub fn finish(&mut self, now: Timestamp) {
        self.finish_at = Some(now);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: Timestamp) {
        self.canceled_at = Some(now);
        self.updated_at = now;
    }

    pub fn make_recurring(&mut self, now: Timestamp) {
        self.finish_at = None;
        self.updated_at = now;
    }

    /// Ends the subscription after one billing cycle of `plan` from `start_at`.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the cycle end cannot be represented.
    pub fn cancel_recurrence(&mut self, plan: &Plan, now: Timestamp) -> Result<(), SubscriptionError> {
        let finish_at = plan.cycle_end(self.start_at).ok_or_else(|| {
            SubscriptionError::invalid_state(
                "cancel recurrence",
                format!(
                    "{} {} after {} is out of range",
                    plan.period, plan.interval, self.start_at
                ),
            )
        })?;
        self.finish_at = Some(finish_at);
        self.updated_at = now;
        Ok(())
    }

    /// Tombstones the subscription.
    pub fn soft_delete(&mut self, now: Timestamp) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}
