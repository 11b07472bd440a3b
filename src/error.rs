//! Scheduling error taxonomy.
//!
//! `SchedulingError` is what individual steps fail with. `OperationError`
//! is what the public operations return: the same cause behind a
//! user-facing prefix naming the operation.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{EntityKind, SessionStatus};
use crate::time_range::TimeRangeError;

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Invalid time range: {0}")]
    Parse(#[from] TimeRangeError),

    #[error("{0}")]
    BusinessRule(String),

    #[error("Counselor {counselor} is not available on {date} at {time}")]
    Availability {
        counselor: String,
        date: NaiveDate,
        time: String,
        conflicting: Vec<Uuid>,
    },

    #[error("{} cannot move from {from} to {to}", .entity.label())]
    InvalidTransition {
        entity: EntityKind,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("{0}")]
    Validation(String),

    #[error("{} not found: {id}", .entity.label())]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("Database error: {0}")]
    Persistence(#[from] DatabaseError),
}

impl SchedulingError {
    /// Stable code for the transport layer to map onto client responses.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulingError::Parse(_) => "PARSE_ERROR",
            SchedulingError::BusinessRule(_) => "BUSINESS_RULE",
            SchedulingError::Availability { .. } => "AVAILABILITY",
            SchedulingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SchedulingError::Validation(_) => "VALIDATION",
            SchedulingError::NotFound { .. } => "NOT_FOUND",
            SchedulingError::Persistence(_) => "PERSISTENCE",
        }
    }

    pub(crate) fn not_found(entity: EntityKind, id: Uuid) -> Self {
        SchedulingError::NotFound { entity, id }
    }
}

/// Failure of a public scheduling operation.
#[derive(Error, Debug)]
#[error("Failed to {operation}: {source}")]
pub struct OperationError {
    pub operation: &'static str,
    #[source]
    pub source: SchedulingError,
}

impl OperationError {
    pub fn new(operation: &'static str, source: SchedulingError) -> Self {
        Self { operation, source }
    }

    /// The underlying step error.
    pub fn kind(&self) -> &SchedulingError {
        &self.source
    }

    pub fn code(&self) -> &'static str {
        self.source.code()
    }

    pub fn into_inner(self) -> SchedulingError {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn operation_error_prefixes_message_and_keeps_cause() {
        let err = OperationError::new(
            "cancel appointment",
            SchedulingError::Validation("A cancellation reason is required".into()),
        );
        assert_eq!(
            err.to_string(),
            "Failed to cancel appointment: A cancellation reason is required"
        );
        assert_eq!(err.code(), "VALIDATION");
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "A cancellation reason is required");
    }

    #[test]
    fn transition_message_names_entity_and_states() {
        let err = SchedulingError::InvalidTransition {
            entity: EntityKind::FollowUp,
            from: SessionStatus::Pending,
            to: SessionStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Follow-up session cannot move from pending to completed"
        );
    }

    #[test]
    fn persistence_wraps_database_error() {
        let err: SchedulingError = DatabaseError::ConstraintViolation("UNIQUE".into()).into();
        assert_eq!(err.code(), "PERSISTENCE");
    }
}
