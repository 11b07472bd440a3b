use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_notification(conn: &Connection, notification: &Notification) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (id, recipient_id, kind, entity_kind, entity_id, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            notification.id.to_string(),
            notification.recipient_id,
            notification.kind.as_str(),
            notification.entity_kind.as_str(),
            notification.entity_id.to_string(),
            notification.message,
            notification.created_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(())
}

/// Notifications addressed to a recipient, newest first.
pub fn list_notifications_for_recipient(
    conn: &Connection,
    recipient_id: &str,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, kind, entity_kind, entity_id, message, created_at
         FROM notifications WHERE recipient_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt
        .query_map(params![recipient_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, recipient_id, kind, entity_kind, entity_id, message, created_at)| {
            Ok(Notification {
                id: parse_uuid("notifications.id", &id)?,
                recipient_id,
                kind: NotificationKind::from_str(&kind)?,
                entity_kind: EntityKind::from_str(&entity_kind)?,
                entity_id: parse_uuid("notifications.entity_id", &entity_id)?,
                message,
                created_at: parse_timestamp("notifications.created_at", &created_at)?,
            })
        })
        .collect()
}

pub fn count_notifications_for_entity(conn: &Connection, entity_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE entity_id = ?1",
        params![entity_id.to_string()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}
