//! Appointment aggregate: create, status updates, cancellation.
//!
//! Each operation builds a fixed step list and hands it to the atomic
//! executor, so rule checks, the conflict check and the write all see the
//! same snapshot under the database write lock.

use chrono::NaiveDate;
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

// ─── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentResponse {
    pub success: bool,
    pub appointment_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub appointment_id: Uuid,
    pub new_status: SessionStatus,
    pub message: String,
}

// ─── Operations ───────────────────────────────────────────────────────────────

impl Scheduler {
    /// Book a new appointment in `pending`.
    pub fn create_appointment(
        &self,
        conn: &Connection,
        data: &NewAppointment,
    ) -> Result<AppointmentResponse, OperationError> {
        self.run("create appointment", data, || {
            require("student_id", &data.student_id)?;
            require("preferred_time", &data.preferred_time)?;
            require("purpose", &data.purpose)?;
            self.check_time(&data.preferred_time)?;

            let now = self.clock().now();
            let id = Uuid::new_v4();

            let mut ops = vec![
                AtomicOperation::EnsureNoActiveAppointment {
                    student_id: data.student_id.clone(),
                },
                AtomicOperation::EnsureDateNotPast {
                    date: data.preferred_date,
                    today: self.clock().today(),
                },
            ];
            if !data.counselor_preference.is_no_preference() {
                ops.push(AtomicOperation::CheckAvailability {
                    scope: ConflictScope::Appointments,
                    counselor: data.counselor_preference.clone(),
                    date: data.preferred_date,
                    time: data.preferred_time.clone(),
                    exclude_id: None,
                });
            }
            ops.push(AtomicOperation::InsertAppointment(Appointment {
                id,
                student_id: data.student_id.clone(),
                counselor_preference: data.counselor_preference.clone(),
                preferred_date: data.preferred_date,
                preferred_time: data.preferred_time.clone(),
                method_type: data.method_type.clone(),
                consultation_type: data.consultation_type.clone(),
                purpose: data.purpose.clone(),
                status: SessionStatus::Pending,
                reason: None,
                created_at: now,
                updated_at: now,
            }));
            ops.push(AtomicOperation::Notify {
                recipient: Recipient::Explicit(data.student_id.clone()),
                kind: NotificationKind::Created,
                entity: EntityKind::Appointment,
                id,
                message: format!(
                    "Your appointment request for {} at {} has been received",
                    data.preferred_date, data.preferred_time
                ),
                created_at: now,
            });
            if let Some(counselor) = data.counselor_preference.counselor_id() {
                ops.push(AtomicOperation::Notify {
                    recipient: Recipient::Explicit(counselor.to_string()),
                    kind: NotificationKind::Created,
                    entity: EntityKind::Appointment,
                    id,
                    message: format!(
                        "New appointment request for {} at {}",
                        data.preferred_date, data.preferred_time
                    ),
                    created_at: now,
                });
            }

            self.executor().execute(
                conn,
                &ops,
                &LockScope::new([
                    Table::Appointments,
                    Table::CounselorAvailability,
                    Table::Notifications,
                ]),
                &ExecuteOptions::labeled("create_appointment"),
            )?;

            Ok(AppointmentResponse {
                success: true,
                appointment_id: id,
                message: "Appointment request submitted".into(),
            })
        })
    }

    /// Move an appointment along the status machine.
    pub fn update_appointment_status(
        &self,
        conn: &Connection,
        id: &Uuid,
        new_status: SessionStatus,
        reason: Option<&str>,
    ) -> Result<StatusUpdateResponse, OperationError> {
        let payload = json!({ "appointment_id": id, "status": new_status, "reason": reason });
        self.run("update appointment status", &payload, || {
            let ops = [
                AtomicOperation::ValidateTransition {
                    entity: EntityKind::Appointment,
                    id: *id,
                    requested: new_status,
                },
                AtomicOperation::UpdateStatus {
                    entity: EntityKind::Appointment,
                    id: *id,
                    status: new_status,
                    reason: reason.map(str::to_string),
                    updated_at: self.clock().now(),
                },
                AtomicOperation::Notify {
                    recipient: Recipient::StudentOf,
                    kind: NotificationKind::StatusChanged,
                    entity: EntityKind::Appointment,
                    id: *id,
                    message: format!("Your appointment is now {new_status}"),
                    created_at: self.clock().now(),
                },
            ];

            self.executor().execute(
                conn,
                &ops,
                &LockScope::new([Table::Appointments, Table::Notifications]),
                &ExecuteOptions::labeled("update_appointment_status"),
            )?;

            Ok(StatusUpdateResponse {
                success: true,
                appointment_id: *id,
                new_status,
                message: format!("Appointment {new_status}"),
            })
        })
    }

    /// Cancel a pending or approved appointment and free its slot.
    pub fn cancel_appointment(
        &self,
        conn: &Connection,
        id: &Uuid,
        reason: &str,
    ) -> Result<AppointmentResponse, OperationError> {
        let payload = json!({ "appointment_id": id, "reason": reason });
        self.run("cancel appointment", &payload, || {
            if reason.trim().is_empty() {
                return Err(SchedulingError::Validation(
                    "A cancellation reason is required".into(),
                ));
            }

            let ops = [
                AtomicOperation::EnsureCancellable {
                    entity: EntityKind::Appointment,
                    id: *id,
                },
                AtomicOperation::UpdateStatus {
                    entity: EntityKind::Appointment,
                    id: *id,
                    status: SessionStatus::Cancelled,
                    reason: Some(reason.trim().to_string()),
                    updated_at: self.clock().now(),
                },
                AtomicOperation::Notify {
                    recipient: Recipient::StudentOf,
                    kind: NotificationKind::Cancelled,
                    entity: EntityKind::Appointment,
                    id: *id,
                    message: format!("Your appointment was cancelled: {}", reason.trim()),
                    created_at: self.clock().now(),
                },
                AtomicOperation::ReleaseCounselorSlot {
                    entity: EntityKind::Appointment,
                    id: *id,
                },
            ];

            self.executor().execute(
                conn,
                &ops,
                &LockScope::new([
                    Table::Appointments,
                    Table::Notifications,
                    Table::CounselorAvailability,
                ]),
                &ExecuteOptions::labeled("cancel_appointment"),
            )?;

            Ok(AppointmentResponse {
                success: true,
                appointment_id: *id,
                message: "Appointment cancelled".into(),
            })
        })
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    pub fn get_appointment(&self, conn: &Connection, id: &Uuid) -> Result<Appointment, OperationError> {
        db::get_appointment(conn, id)
            .map_err(SchedulingError::from)
            .and_then(|found| found.ok_or_else(|| SchedulingError::not_found(EntityKind::Appointment, *id)))
            .map_err(|e| OperationError::new("load appointment", e))
    }

    pub fn list_student_appointments(
        &self,
        conn: &Connection,
        student_id: &str,
    ) -> Result<Vec<Appointment>, OperationError> {
        db::list_appointments_for_student(conn, student_id)
            .map_err(|e| OperationError::new("list student appointments", e.into()))
    }

    /// Pending and approved bookings for a counselor on one day.
    pub fn list_counselor_schedule(
        &self,
        conn: &Connection,
        counselor_id: &str,
        date: &NaiveDate,
    ) -> Result<Vec<Appointment>, OperationError> {
        db::find_active_appointments_for_counselor(conn, counselor_id, date)
            .map_err(|e| OperationError::new("list counselor schedule", e.into()))
    }
}
