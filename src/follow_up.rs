//! Follow-up chains hanging off a parent appointment.
//!
//! Sessions in a chain are numbered 1, 2, 3… by `follow_up_sequence`. A
//! student holds at most one pending follow-up at a time, and only pending
//! follow-ups contest a counselor's slot.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::atomic::{AtomicOperation, ExecuteOptions, LockScope, Recipient, Table};
use crate::conflict::ConflictScope;
use crate::db;
use crate::error::{OperationError, SchedulingError};
use crate::models::*;
use crate::scheduler::{require, Scheduler};

#[derive(Debug, Clone, Serialize)]
pub struct FollowUpResponse {
    pub success: bool,
    pub follow_up_id: Uuid,
    pub parent_appointment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<SessionStatus>,
    pub message: String,
}

/// Next number in a parent's chain: one past the highest, or 1.
pub fn next_sequence(conn: &Connection, parent_id: &Uuid) -> Result<u32, SchedulingError> {
    let max = db::max_follow_up_sequence(conn, parent_id)?;
    Ok(max.map_or(1, |m| m + 1))
}

impl Scheduler {
    pub fn create_follow_up(
        &self,
        conn: &Connection,
        data: &NewFollowUp,
    ) -> Result<FollowUpResponse, OperationError> {
        self.run("create follow-up session", data, || {
            require("student_id", &data.student_id)?;
            require("preferred_time", &data.preferred_time)?;
            self.check_time(&data.preferred_time)?;

            let id = Uuid::new_v4();
            let mut ops = vec![
                AtomicOperation::EnsureNoPendingFollowUp {
                    student_id: data.student_id.clone(),
                },
                AtomicOperation::EnsureParentAppointment {
                    parent_id: data.parent_appointment_id,
                    student_id: data.student_id.clone(),
                },
                AtomicOperation::EnsureDateNotPast {
                    date: data.preferred_date,
                    today: self.clock().today(),
                },
            ];
            if !data.counselor_id.is_no_preference() {
                ops.push(AtomicOperation::CheckAvailability {
                    scope: ConflictScope::FollowUps,
                    counselor: data.counselor_id.clone(),
                    date: data.preferred_date,
                    time: data.preferred_time.clone(),
                    exclude_id: None,
                });
            }
            ops.push(AtomicOperation::InsertFollowUp {
                id,
                request: data.clone(),
                created_at: self.clock().now(),
            });
            ops.push(AtomicOperation::Notify {
                recipient: Recipient::Explicit(data.student_id.clone()),
                kind: NotificationKind::Created,
                entity: EntityKind::FollowUp,
                id,
                message: format!(
                    "Follow-up session scheduled for {} at {}",
                    data.preferred_date, data.preferred_time
                ),
                created_at: self.clock().now(),
            });

            let outcome = self.executor().execute(
                conn,
                &ops,
                &LockScope::new([
                    Table::FollowUpSessions,
                    Table::Appointments,
                    Table::CounselorAvailability,
                    Table::Notifications,
                ]),
                &ExecuteOptions::labeled("create_follow_up"),
            )?;

            let sequence = outcome.follow_up_sequence();
            Ok(FollowUpResponse {
                success: true,
                follow_up_id: id,
                parent_appointment_id: data.parent_appointment_id,
                follow_up_sequence: sequence,
                new_status: Some(SessionStatus::Pending),
                message: match sequence {
                    Some(n) => format!("Follow-up session #{n} scheduled"),
                    None => "Follow-up session scheduled".into(),
                },
            })
        })
    }

    /// Approve or reject (or any other legal move) for a follow-up session.
    pub fn update_follow_up_status(
        &self,
        conn: &Connection,
        id: &Uuid,
        new_status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<FollowUpResponse, OperationError> {
        let payload = json!({ "follow_up_id": id, "status": new_status, "reason": reason });
        self.run("update follow-up session status", &payload, || {
            self.transition_follow_up(conn, id, new_status, reason, "update_follow_up_status")
        })
    }

    pub fn complete_follow_up(
        &self,
        conn: &Connection,
        id: &Uuid,
    ) -> Result<FollowUpResponse, OperationError> {
        let payload = json!({ "follow_up_id": id });
        self.run("complete follow-up session", &payload, || {
            self.transition_follow_up(conn, id, SessionStatus::Completed, None, "complete_follow_up")
        })
    }

    pub fn cancel_follow_up(
        &self,
        conn: &Connection,
        id: &Uuid,
        reason: &str,
    ) -> Result<FollowUpResponse, OperationError> {
        let payload = json!({ "follow_up_id": id, "reason": reason });
        self.run("cancel follow-up session", &payload, || {
            if reason.trim().is_empty() {
                return Err(SchedulingError::Validation(
                    "A cancellation reason is required".into(),
                ));
            }

            let ops = [
                AtomicOperation::EnsureCancellable {
                    entity: EntityKind::FollowUp,
                    id: *id,
                },
                AtomicOperation::UpdateStatus {
                    entity: EntityKind::FollowUp,
                    id: *id,
                    status: SessionStatus::Cancelled,
                    reason: Some(reason.trim().to_string()),
                    updated_at: self.clock().now(),
                },
                AtomicOperation::Notify {
                    recipient: Recipient::StudentOf,
                    kind: NotificationKind::Cancelled,
                    entity: EntityKind::FollowUp,
                    id: *id,
                    message: format!("Your follow-up session was cancelled: {}", reason.trim()),
                    created_at: self.clock().now(),
                },
                AtomicOperation::ReleaseCounselorSlot {
                    entity: EntityKind::FollowUp,
                    id: *id,
                },
            ];
            self.executor().execute(
                conn,
                &ops,
                &LockScope::new([
                    Table::FollowUpSessions,
                    Table::Notifications,
                    Table::CounselorAvailability,
                ]),
                &ExecuteOptions::labeled("cancel_follow_up"),
            )?;

            self.follow_up_response(conn, id, SessionStatus::Cancelled, "Follow-up session cancelled".into())
        })
    }

    /// Sessions of one parent, in sequence order.
    pub fn list_chain(
        &self,
        conn: &Connection,
        parent_id: &Uuid,
    ) -> Result<Vec<FollowUpSession>, OperationError> {
        db::list_follow_ups_for_parent(conn, parent_id)
            .map_err(|e| OperationError::new("list follow-up chain", e.into()))
    }

    fn transition_follow_up(
        &self,
        conn: &Connection,
        id: &Uuid,
        new_status: SessionStatus,
        reason: Option<&str>,
        label: &'static str,
    ) -> Result<FollowUpResponse, SchedulingError> {
        let ops = [
            AtomicOperation::ValidateTransition {
                entity: EntityKind::FollowUp,
                id: *id,
                requested: new_status,
            },
            AtomicOperation::UpdateStatus {
                entity: EntityKind::FollowUp,
                id: *id,
                status: new_status,
                reason: reason.map(str::to_string),
                updated_at: self.clock().now(),
            },
            AtomicOperation::Notify {
                recipient: Recipient::StudentOf,
                kind: NotificationKind::StatusChanged,
                entity: EntityKind::FollowUp,
                id: *id,
                message: format!("Your follow-up session is now {new_status}"),
                created_at: self.clock().now(),
            },
        ];
        self.executor().execute(
            conn,
            &ops,
            &LockScope::new([Table::FollowUpSessions, Table::Notifications]),
            &ExecuteOptions::labeled(label),
        )?;

        self.follow_up_response(conn, id, new_status, format!("Follow-up session {new_status}"))
    }

    fn follow_up_response(
        &self,
        conn: &Connection,
        id: &Uuid,
        new_status: SessionStatus,
        message: String,
    ) -> Result<FollowUpResponse, SchedulingError> {
        let session = db::get_follow_up(conn, id)?
            .ok_or_else(|| SchedulingError::not_found(EntityKind::FollowUp, *id))?;
        Ok(FollowUpResponse {
            success: true,
            follow_up_id: *id,
            parent_appointment_id: session.parent_appointment_id,
            follow_up_sequence: Some(session.follow_up_sequence),
            new_status: Some(new_status),
            message,
        })
    }
}
