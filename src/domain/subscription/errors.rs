//! Errors surfaced by lifecycle, ledger and evaluator operations.
//!
//! | Variant | Kind |
//! |---------|------|
//! | NotFound | NotFound |
//! | FeatureNotEntitled | NotFound |
//! | InactiveSubscription | InactiveSubscription |
//! | InvalidState | InvalidState |
//! | Precondition | Precondition |
//! | Validation | Precondition |
//! | Infrastructure | Infrastructure |

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, PlanId, SubscriptionId, ValidationError};

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InactiveSubscription,
    InvalidState,
    Precondition,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// A plan, feature, subscription or usage row does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The feature exists but the plan does not grant it.
    #[error("feature '{feature}' is not part of plan {plan_id}")]
    FeatureNotEntitled { feature: String, plan_id: PlanId },

    #[error("subscription {0} is not active")]
    InactiveSubscription(SubscriptionId),

    #[error("cannot {attempted}: {reason}")]
    InvalidState { attempted: String, reason: String },

    /// A required input, such as the acting entity, is missing.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        SubscriptionError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn feature_not_entitled(feature: impl Into<String>, plan_id: PlanId) -> Self {
        SubscriptionError::FeatureNotEntitled {
            feature: feature.into(),
            plan_id,
        }
    }

    pub fn inactive(id: SubscriptionId) -> Self {
        SubscriptionError::InactiveSubscription(id)
    }

    pub fn invalid_state(attempted: impl Into<String>, reason: impl Into<String>) -> Self {
        SubscriptionError::InvalidState {
            attempted: attempted.into(),
            reason: reason.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        SubscriptionError::Precondition(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SubscriptionError::NotFound { .. } | SubscriptionError::FeatureNotEntitled { .. } => {
                ErrorKind::NotFound
            }
            SubscriptionError::InactiveSubscription(_) => ErrorKind::InactiveSubscription,
            SubscriptionError::InvalidState { .. } => ErrorKind::InvalidState,
            SubscriptionError::Precondition(_) | SubscriptionError::Validation(_) => {
                ErrorKind::Precondition
            }
            SubscriptionError::Infrastructure(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn code(&self) -> ErrorCode {
        match self.kind() {
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::InactiveSubscription | ErrorKind::InvalidState => {
                ErrorCode::InvalidStateTransition
            }
            ErrorKind::Precondition => ErrorCode::ValidationFailed,
            ErrorKind::Infrastructure => ErrorCode::DatabaseError,
        }
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::InvalidStateTransition => SubscriptionError::InvalidState {
                attempted: "transition".to_string(),
                reason: err.message,
            },
            ErrorCode::ValidationFailed => SubscriptionError::Precondition(err.message),
            ErrorCode::NotFound => SubscriptionError::NotFound {
                entity: "record",
                key: err.message,
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}
