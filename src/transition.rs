//! Status state machine shared by appointments and follow-up sessions.
//!
//! ```text
//! pending  ──► approved ──► completed
//!    │            │
//!    ▼            ▼
//! rejected    cancelled
//! ```
//!
//! `rejected`, `completed` and `cancelled` are terminal.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::error::SchedulingError;
use crate::models::{EntityKind, SessionStatus};

/// Outgoing edges for a status.
pub fn allowed_transitions(current: SessionStatus) -> &'static [SessionStatus] {
    match current {
        SessionStatus::Pending => &[SessionStatus::Approved, SessionStatus::Rejected],
        SessionStatus::Approved => &[SessionStatus::Completed, SessionStatus::Cancelled],
        SessionStatus::Rejected | SessionStatus::Completed | SessionStatus::Cancelled => &[],
    }
}

pub fn validate_transition(
    entity: EntityKind,
    current: SessionStatus,
    requested: SessionStatus,
) -> Result<(), SchedulingError> {
    if allowed_transitions(current).contains(&requested) {
        Ok(())
    } else {
        Err(SchedulingError::InvalidTransition {
            entity,
            from: current,
            to: requested,
        })
    }
}

/// Read the record's status through `conn` (the open transaction).
pub fn current_status(
    conn: &Connection,
    entity: EntityKind,
    id: &Uuid,
) -> Result<SessionStatus, SchedulingError> {
    let status = match entity {
        EntityKind::Appointment => db::get_appointment_status(conn, id)?,
        EntityKind::FollowUp => db::get_follow_up_status(conn, id)?,
    };
    status.ok_or_else(|| SchedulingError::not_found(entity, *id))
}

/// Re-read the current status and check `requested` against it.
/// Returns the status that was current at validation time.
pub fn validate_stored_transition(
    conn: &Connection,
    entity: EntityKind,
    id: &Uuid,
    requested: SessionStatus,
) -> Result<SessionStatus, SchedulingError> {
    let current = current_status(conn, entity, id)?;
    validate_transition(entity, current, requested)?;
    Ok(current)
}
