use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{parse_date, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const FOLLOW_UP_COLUMNS: &str = "id, counselor_id, student_id, parent_appointment_id,
     follow_up_sequence, preferred_date, preferred_time, consultation_type, status, reason,
     created_at, updated_at";

pub fn insert_follow_up(conn: &Connection, session: &FollowUpSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO follow_up_sessions (id, counselor_id, student_id, parent_appointment_id,
         follow_up_sequence, preferred_date, preferred_time, consultation_type, status, reason,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            session.id.to_string(),
            session.counselor_id.as_str(),
            session.student_id,
            session.parent_appointment_id.to_string(),
            session.follow_up_sequence,
            session.preferred_date.format(DATE_FORMAT).to_string(),
            session.preferred_time,
            session.consultation_type,
            session.status.as_str(),
            session.reason,
            session.created_at.format(TIMESTAMP_FORMAT).to_string(),
            session.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

pub fn get_follow_up(conn: &Connection, id: &Uuid) -> Result<Option<FollowUpSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_sessions WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id.to_string()], read_row) {
        Ok(row) => Ok(Some(follow_up_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_follow_up_status(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<SessionStatus>, DatabaseError> {
    let result = conn.query_row(
        "SELECT status FROM follow_up_sessions WHERE id = ?1",
        params![id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(status) => Ok(Some(SessionStatus::from_str(&status)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Highest sequence number in a parent's chain, `None` for an empty chain.
pub fn max_follow_up_sequence(conn: &Connection, parent_id: &Uuid) -> Result<Option<u32>, DatabaseError> {
    let max = conn.query_row(
        "SELECT MAX(follow_up_sequence) FROM follow_up_sessions WHERE parent_appointment_id = ?1",
        params![parent_id.to_string()],
        |row| row.get::<_, Option<u32>>(0),
    )?;
    Ok(max)
}

pub fn find_pending_follow_up_for_student(
    conn: &Connection,
    student_id: &str,
) -> Result<Option<FollowUpSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_sessions
         WHERE student_id = ?1 AND status = 'pending'
         ORDER BY created_at DESC LIMIT 1"
    ))?;

    match stmt.query_row(params![student_id], read_row) {
        Ok(row) => Ok(Some(follow_up_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pending follow-ups for a counselor on a date. Approved and completed
/// sessions are deliberately left out of the contested set.
pub fn find_pending_follow_ups_for_counselor(
    conn: &Connection,
    counselor_id: &str,
    date: &NaiveDate,
) -> Result<Vec<FollowUpSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_sessions
         WHERE counselor_id = ?1 AND preferred_date = ?2 AND status = 'pending'
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![counselor_id, date.format(DATE_FORMAT).to_string()],
        read_row,
    )?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(follow_up_from_row(row?)?);
    }
    Ok(sessions)
}

/// The whole chain for a parent, ordered by sequence.
pub fn list_follow_ups_for_parent(
    conn: &Connection,
    parent_id: &Uuid,
) -> Result<Vec<FollowUpSession>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FOLLOW_UP_COLUMNS} FROM follow_up_sessions
         WHERE parent_appointment_id = ?1
         ORDER BY follow_up_sequence ASC"
    ))?;

    let rows = stmt.query_map(params![parent_id.to_string()], read_row)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(follow_up_from_row(row?)?);
    }
    Ok(sessions)
}

pub fn update_follow_up_status(
    conn: &Connection,
    id: &Uuid,
    status: SessionStatus,
    reason: Option<&str>,
    updated_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn
        .execute(
            "UPDATE follow_up_sessions
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
            entity_type: "FollowUpSession".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn purge_terminal_follow_ups(conn: &Connection, cutoff: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM follow_up_sessions
         WHERE status IN ('rejected', 'completed', 'cancelled') AND updated_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

struct FollowUpRow {
    id: String,
    counselor_id: String,
    student_id: String,
    parent_appointment_id: String,
    follow_up_sequence: u32,
    preferred_date: String,
    preferred_time: String,
    consultation_type: String,
    status: String,
    reason: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<FollowUpRow> {
    Ok(FollowUpRow {
        id: row.get(0)?,
        counselor_id: row.get(1)?,
        student_id: row.get(2)?,
        parent_appointment_id: row.get(3)?,
        follow_up_sequence: row.get(4)?,
        preferred_date: row.get(5)?,
        preferred_time: row.get(6)?,
        consultation_type: row.get(7)?,
        status: row.get(8)?,
        reason: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn follow_up_from_row(row: FollowUpRow) -> Result<FollowUpSession, DatabaseError> {
    Ok(FollowUpSession {
        id: parse_uuid("follow_up_sessions.id", &row.id)?,
        counselor_id: CounselorRef::from(row.counselor_id),
        student_id: row.student_id,
        parent_appointment_id: parse_uuid(
            "follow_up_sessions.parent_appointment_id",
            &row.parent_appointment_id,
        )?,
        follow_up_sequence: row.follow_up_sequence,
        preferred_date: parse_date("follow_up_sessions.preferred_date", &row.preferred_date)?,
        preferred_time: row.preferred_time,
        consultation_type: row.consultation_type,
        status: SessionStatus::from_str(&row.status)?,
        reason: row.reason,
        created_at: parse_timestamp("follow_up_sessions.created_at", &row.created_at)?,
        updated_at: parse_timestamp("follow_up_sessions.updated_at", &row.updated_at)?,
    })
}
