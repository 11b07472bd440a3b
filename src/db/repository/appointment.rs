use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{parse_date, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, student_id, counselor_preference, preferred_date, preferred_time,
     method_type, consultation_type, purpose, status, reason, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments (id, student_id, counselor_preference, preferred_date,
         preferred_time, method_type, consultation_type, purpose, status, reason,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            appt.id.to_string(),
            appt.student_id,
            appt.counselor_preference.as_str(),
            appt.preferred_date.format(DATE_FORMAT).to_string(),
            appt.preferred_time,
            appt.method_type,
            appt.consultation_type,
            appt.purpose,
            appt.status.as_str(),
            appt.reason,
            appt.created_at.format(TIMESTAMP_FORMAT).to_string(),
            appt.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id.to_string()], read_row) {
        Ok(row) => Ok(Some(appointment_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Current status only. Used by transition checks that must re-read inside
/// the active transaction.
pub fn get_appointment_status(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<SessionStatus>, DatabaseError> {
    let result = conn.query_row(
        "SELECT status FROM appointments WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(status) => Ok(Some(SessionStatus::from_str(&status)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The student's pending or approved appointment, if any.
pub fn find_active_appointment_for_student(
    conn: &Connection,
    student_id: &str,
) -> Result<Option<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE student_id = ?1 AND status IN ('pending', 'approved')
         ORDER BY created_at DESC LIMIT 1"
    ))?;

    match stmt.query_row(params![student_id], read_row) {
        Ok(row) => Ok(Some(appointment_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending/approved appointments booked with a counselor on a date.
pub fn find_active_appointments_for_counselor(
    conn: &Connection,
    counselor_id: &str,
    date: &NaiveDate,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE counselor_preference = ?1 AND preferred_date = ?2
           AND status IN ('pending', 'approved')
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![counselor_id, date.format(DATE_FORMAT).to_string()],
        read_row,
    )?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

pub fn list_appointments_for_student(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE student_id = ?1
         ORDER BY preferred_date DESC, created_at DESC"
    ))?;

    let rows = stmt.query_map(params![student_id], read_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

/// Set status (and reason, when given). Leaves an existing reason untouched
/// when `reason` is `None`.
pub fn update_appointment_status(
    conn: &Connection,
    id: &Uuid,
    status: SessionStatus,
    reason: Option<&str>,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE appointments
             SET status = ?2, reason = COALESCE(?3, reason), updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                status.as_str(),
                reason,
                updated_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )
        .map_err(DatabaseError::from_write)?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Appointment".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete terminal appointments last touched before `cutoff`, skipping any
/// that still anchor a follow-up the same purge would keep (open, or
/// terminal but touched on or after `cutoff`). Deleting a parent cascades
/// to its follow-ups.
pub fn purge_terminal_appointments(conn: &Connection, cutoff: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM appointments
         WHERE status IN ('rejected', 'completed', 'cancelled')
           AND updated_at < ?1
           AND NOT EXISTS (
               SELECT 1 FROM follow_up_sessions f
               WHERE f.parent_appointment_id = appointments.id
                 AND (f.status IN ('pending', 'approved') OR f.updated_at >= ?1)
           )",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

struct AppointmentRow {
    id: String,
    student_id: String,
    counselor_preference: String,
    preferred_date: String,
    preferred_time: String,
    method_type: String,
    consultation_type: String,
    purpose: String,
    status: String,
    reason: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        student_id: row.get(1)?,
        counselor_preference: row.get(2)?,
        preferred_date: row.get(3)?,
        preferred_time: row.get(4)?,
        method_type: row.get(5)?,
        consultation_type: row.get(6)?,
        purpose: row.get(7)?,
        status: row.get(8)?,
        reason: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid("appointments.id", &row.id)?,
        student_id: row.student_id,
        counselor_preference: CounselorRef::from(row.counselor_preference),
        preferred_date: parse_date("appointments.preferred_date", &row.preferred_date)?,
        preferred_time: row.preferred_time,
        method_type: row.method_type,
        consultation_type: row.consultation_type,
        purpose: row.purpose,
        status: SessionStatus::from_str(&row.status)?,
        reason: row.reason,
        created_at: parse_timestamp("appointments.created_at", &row.created_at)?,
        updated_at: parse_timestamp("appointments.updated_at", &row.updated_at)?,
    })
}
