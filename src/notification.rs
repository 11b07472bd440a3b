//! Notification side-effect stub.
//!
//! Scheduling operations emit a notification row per state change; delivery
//! (email, push) happens elsewhere and reads the `notifications` table.
//! Failures here are logged by the executor, never escalated.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{EntityKind, Notification, NotificationKind};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub message: String,
    /// Taken from the scheduler's clock.
    pub created_at: NaiveDateTime,
}

/// Sink for scheduling notifications. `conn` is the open transaction.
pub trait Notifier: Send + Sync {
    fn notify(&self, conn: &Connection, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Writes one `notifications` row per request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteNotifier;

impl Notifier for SqliteNotifier {
    fn notify(&self, conn: &Connection, request: &NotificationRequest) -> Result<(), NotifyError> {
        db::insert_notification(conn, &Notification {
            id: Uuid::new_v4(),
            recipient_id: request.recipient_id.clone(),
            kind: request.kind,
            entity_kind: request.entity_kind,
            entity_id: request.entity_id,
            message: request.message.clone(),
            created_at: request.created_at,
        })?;
        Ok(())
    }
}

/// Drops every request. Selected when notifications are disabled in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, _conn: &Connection, request: &NotificationRequest) -> Result<(), NotifyError> {
        tracing::debug!(
            recipient = %request.recipient_id,
            kind = request.kind.as_str(),
            "Notifications disabled, dropping"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::TIMESTAMP_FORMAT;

    fn request() -> NotificationRequest {
        NotificationRequest {
            recipient_id: "s-1".into(),
            kind: NotificationKind::Created,
            entity_kind: EntityKind::Appointment,
            entity_id: Uuid::new_v4(),
            message: "Appointment request received".into(),
            created_at: NaiveDateTime::parse_from_str("2025-03-01 09:00:00", TIMESTAMP_FORMAT).unwrap(),
        }
    }

    #[test]
    fn sqlite_notifier_writes_row() {
        let conn = open_memory_database().unwrap();
        let req = request();
        SqliteNotifier.notify(&conn, &req).unwrap();
        let rows = db::list_notifications_for_recipient(&conn, "s-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, req.entity_id);
        assert_eq!(rows[0].message, "Appointment request received");
        assert_eq!(rows[0].created_at, req.created_at);
    }

    #[test]
    fn disabled_notifier_writes_nothing() {
        let conn = open_memory_database().unwrap();
        let req = request();
        DisabledNotifier.notify(&conn, &req).unwrap();
        assert_eq!(db::count_notifications_for_entity(&conn, &req.entity_id).unwrap(), 0);
    }
}
