//! Counselor double-booking detection.
//!
//! Read-only. Callers run it through the same transaction as the write it
//! guards, otherwise a concurrent booking can slip in between check and
//! insert.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::error::SchedulingError;
use crate::models::{CounselorRef, EntityKind, SessionStatus};
use crate::time_range::ranges_conflict;

/// Which existing records contest a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictScope {
    /// Pending or approved appointments.
    Appointments,
    /// Pending follow-up sessions only.
    FollowUps,
}

impl ConflictScope {
    pub fn entity(&self) -> EntityKind {
        match self {
            ConflictScope::Appointments => EntityKind::Appointment,
            ConflictScope::FollowUps => EntityKind::FollowUp,
        }
    }
}

/// An existing record whose slot overlaps the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingRecord {
    pub id: Uuid,
    pub entity: EntityKind,
    pub student_id: String,
    pub preferred_time: String,
    pub status: SessionStatus,
}

/// Requested slot for a counselor on a date.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub counselor: &'a CounselorRef,
    pub date: &'a NaiveDate,
    pub time: &'a str,
    /// Record to ignore, e.g. the one being rescheduled.
    pub exclude_id: Option<&'a Uuid>,
}

pub fn find_conflicts(
    conn: &Connection,
    scope: ConflictScope,
    slot: &SlotRequest<'_>,
) -> Result<Vec<ConflictingRecord>, SchedulingError> {
    let Some(counselor_id) = slot.counselor.counselor_id() else {
        return Ok(Vec::new());
    };

    let existing: Vec<ConflictingRecord> = match scope {
        ConflictScope::Appointments => {
            db::find_active_appointments_for_counselor(conn, counselor_id, slot.date)?
                .into_iter()
                .map(|a| ConflictingRecord {
                    id: a.id,
                    entity: EntityKind::Appointment,
                    student_id: a.student_id,
                    preferred_time: a.preferred_time,
                    status: a.status,
                })
                .collect()
        }
        ConflictScope::FollowUps => {
            db::find_pending_follow_ups_for_counselor(conn, counselor_id, slot.date)?
                .into_iter()
                .map(|f| ConflictingRecord {
                    id: f.id,
                    entity: EntityKind::FollowUp,
                    student_id: f.student_id,
                    preferred_time: f.preferred_time,
                    status: f.status,
                })
                .collect()
        }
    };

    Ok(existing
        .into_iter()
        .filter(|record| slot.exclude_id != Some(&record.id))
        .filter(|record| ranges_conflict(&record.preferred_time, slot.time))
        .collect())
}

pub fn has_conflict(
    conn: &Connection,
    scope: ConflictScope,
    slot: &SlotRequest<'_>,
) -> Result<bool, SchedulingError> {
    Ok(!find_conflicts(conn, scope, slot)?.is_empty())
}

/// `Availability` error when the slot is taken, with the clashing ids.
pub fn ensure_available(
    conn: &Connection,
    scope: ConflictScope,
    slot: &SlotRequest<'_>,
) -> Result<(), SchedulingError> {
    let conflicts = find_conflicts(conn, scope, slot)?;
    if conflicts.is_empty() {
        return Ok(());
    }

    tracing::info!(
        counselor = %slot.counselor,
        date = %slot.date,
        time = slot.time,
        conflicts = conflicts.len(),
        "Requested slot overlaps existing booking"
    );
    Err(SchedulingError::Availability {
        counselor: slot.counselor.to_string(),
        date: *slot.date,
        time: slot.time.to_string(),
        conflicting: conflicts.into_iter().map(|c| c.id).collect(),
    })
}
