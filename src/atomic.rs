//! All-or-nothing execution of scheduling steps.
//!
//! A batch is an ordered `Vec<AtomicOperation>` plus the `LockScope` it
//! declares. The executor:
//! 1. rejects the batch if any step touches a table outside the scope,
//! 2. opens one SQLite transaction (`BEGIN IMMEDIATE` by default, which takes
//!    the database write lock up front so no other writer can interleave
//!    between a conflict check and the insert that follows it),
//! 3. runs each step against that transaction,
//! 4. commits, or rolls everything back on the first failing step.
//!
//! Notification steps are the one exception: they run inside a savepoint and
//! a failure there is logged and recorded, not propagated.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use crate::conflict::{self, ConflictScope, SlotRequest};
use crate::db::{self, DatabaseError};
use crate::error::SchedulingError;
use crate::follow_up::next_sequence;
use crate::models::*;
use crate::notification::{NotificationRequest, Notifier, NotifyError};
use crate::transition;

// ═══════════════════════════════════════════════════════════
// Lock scope
// ═══════════════════════════════════════════════════════════

/// Logical key spaces a batch may touch.
///
/// `CounselorAvailability` has no table of its own: availability is derived
/// from appointment and follow-up rows, and the name marks steps that read or
/// release a counselor's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Appointments,
    FollowUpSessions,
    CounselorAvailability,
    Notifications,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Appointments => "appointments",
            Table::FollowUpSessions => "follow_up_sessions",
            Table::CounselorAvailability => "counselor_availability",
            Table::Notifications => "notifications",
        }
    }

    fn for_entity(entity: EntityKind) -> Self {
        match entity {
            EntityKind::Appointment => Table::Appointments,
            EntityKind::FollowUp => Table::FollowUpSessions,
        }
    }
}

/// Tables a batch declares as protected for its duration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockScope(BTreeSet<Table>);

impl LockScope {
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Self {
        Self(tables.into_iter().collect())
    }

    pub fn contains(&self, table: Table) -> bool {
        self.0.contains(&table)
    }

    pub fn tables(&self) -> impl Iterator<Item = Table> + '_ {
        self.0.iter().copied()
    }
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Table::as_str).collect();
        write!(f, "{}", names.join(", "))
    }
}

// ═══════════════════════════════════════════════════════════
// Options
// ═══════════════════════════════════════════════════════════

/// SQLite transaction behavior for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Locks acquired lazily; a read-then-write batch can hit `SQLITE_BUSY`
    /// on upgrade. Only suitable for read-only batches.
    Deferred,
    #[default]
    Immediate,
    Exclusive,
}

impl TransactionMode {
    fn behavior(self) -> TransactionBehavior {
        match self {
            TransactionMode::Deferred => TransactionBehavior::Deferred,
            TransactionMode::Immediate => TransactionBehavior::Immediate,
            TransactionMode::Exclusive => TransactionBehavior::Exclusive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub mode: TransactionMode,
    /// Batch name used in log lines.
    pub label: &'static str,
}

impl ExecuteOptions {
    pub fn labeled(label: &'static str) -> Self {
        Self { label, ..Self::default() }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            mode: TransactionMode::default(),
            label: "atomic_batch",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════

/// Who receives a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Explicit(String),
    /// The student on the record, resolved inside the transaction.
    StudentOf,
}

/// One step of a batch. Closed set; the executor matches exhaustively.
#[derive(Debug, Clone)]
pub enum AtomicOperation {
    EnsureNoActiveAppointment {
        student_id: String,
    },
    EnsureNoPendingFollowUp {
        student_id: String,
    },
    EnsureDateNotPast {
        date: NaiveDate,
        today: NaiveDate,
    },
    EnsureParentAppointment {
        parent_id: Uuid,
        student_id: String,
    },
    CheckAvailability {
        scope: ConflictScope,
        counselor: CounselorRef,
        date: NaiveDate,
        time: String,
        exclude_id: Option<Uuid>,
    },
    InsertAppointment(Appointment),
    /// Sequence number is assigned inside the step.
    InsertFollowUp {
        id: Uuid,
        request: NewFollowUp,
        created_at: NaiveDateTime,
    },
    ValidateTransition {
        entity: EntityKind,
        id: Uuid,
        requested: SessionStatus,
    },
    EnsureCancellable {
        entity: EntityKind,
        id: Uuid,
    },
    UpdateStatus {
        entity: EntityKind,
        id: Uuid,
        status: SessionStatus,
        reason: Option<String>,
        updated_at: NaiveDateTime,
    },
    Notify {
        recipient: Recipient,
        kind: NotificationKind,
        entity: EntityKind,
        id: Uuid,
        message: String,
        created_at: NaiveDateTime,
    },
    ReleaseCounselorSlot {
        entity: EntityKind,
        id: Uuid,
    },
    PurgeTerminal {
        cutoff: NaiveDateTime,
    },
}

impl AtomicOperation {
    pub fn name(&self) -> &'static str {
        match self {
            AtomicOperation::EnsureNoActiveAppointment { .. } => "ensure_no_active_appointment",
            AtomicOperation::EnsureNoPendingFollowUp { .. } => "ensure_no_pending_follow_up",
            AtomicOperation::EnsureDateNotPast { .. } => "ensure_date_not_past",
            AtomicOperation::EnsureParentAppointment { .. } => "ensure_parent_appointment",
            AtomicOperation::CheckAvailability { .. } => "check_availability",
            AtomicOperation::InsertAppointment(_) => "insert_appointment",
            AtomicOperation::InsertFollowUp { .. } => "insert_follow_up",
            AtomicOperation::ValidateTransition { .. } => "validate_transition",
            AtomicOperation::EnsureCancellable { .. } => "ensure_cancellable",
            AtomicOperation::UpdateStatus { .. } => "update_status",
            AtomicOperation::Notify { .. } => "notify",
            AtomicOperation::ReleaseCounselorSlot { .. } => "release_counselor_slot",
            AtomicOperation::PurgeTerminal { .. } => "purge_terminal",
        }
    }

    /// Tables this step reads or writes.
    pub fn tables(&self) -> Vec<Table> {
        match self {
            AtomicOperation::EnsureNoActiveAppointment { .. }
            | AtomicOperation::EnsureParentAppointment { .. }
            | AtomicOperation::InsertAppointment(_) => vec![Table::Appointments],
            AtomicOperation::EnsureNoPendingFollowUp { .. }
            | AtomicOperation::InsertFollowUp { .. } => vec![Table::FollowUpSessions],
            AtomicOperation::EnsureDateNotPast { .. } => vec![],
            AtomicOperation::CheckAvailability { scope, .. } => vec![
                Table::for_entity(scope.entity()),
                Table::CounselorAvailability,
            ],
            AtomicOperation::ValidateTransition { entity, .. }
            | AtomicOperation::EnsureCancellable { entity, .. }
            | AtomicOperation::UpdateStatus { entity, .. } => vec![Table::for_entity(*entity)],
            AtomicOperation::Notify { recipient, entity, .. } => match recipient {
                Recipient::Explicit(_) => vec![Table::Notifications],
                Recipient::StudentOf => vec![Table::Notifications, Table::for_entity(*entity)],
            },
            AtomicOperation::ReleaseCounselorSlot { .. } => vec![Table::CounselorAvailability],
            AtomicOperation::PurgeTerminal { .. } => {
                vec![Table::Appointments, Table::FollowUpSessions]
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    Checked,
    Inserted { id: Uuid },
    FollowUpInserted { id: Uuid, sequence: u32 },
    StatusValidated { current: SessionStatus },
    StatusUpdated { id: Uuid, status: SessionStatus },
    Notified,
    NotificationSkipped { error: String },
    SlotReleased { id: Uuid },
    Purged { appointments: usize, follow_ups: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: &'static str,
    pub success: bool,
    pub payload: StepPayload,
}

/// Per-step results of one committed batch.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOutcome {
    pub label: &'static str,
    pub steps: Vec<StepResult>,
}

impl TransactionOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.success)
    }

    pub fn payloads(&self) -> impl Iterator<Item = &StepPayload> {
        self.steps.iter().map(|s| &s.payload)
    }

    /// Sequence stamped by an `InsertFollowUp` step, if the batch had one.
    pub fn follow_up_sequence(&self) -> Option<u32> {
        self.payloads().find_map(|p| match p {
            StepPayload::FollowUpInserted { sequence, .. } => Some(*sequence),
            _ => None,
        })
    }

    pub fn purged(&self) -> Option<(usize, usize)> {
        self.payloads().find_map(|p| match p {
            StepPayload::Purged { appointments, follow_ups } => Some((*appointments, *follow_ups)),
            _ => None,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Executor
// ═══════════════════════════════════════════════════════════

pub struct AtomicExecutor<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> AtomicExecutor<'a> {
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        Self { notifier }
    }

    /// Run `operations` in order inside one transaction on `conn`.
    ///
    /// `conn` must not already be inside a transaction.
    pub fn execute(
        &self,
        conn: &Connection,
        operations: &[AtomicOperation],
        scope: &LockScope,
        options: &ExecuteOptions,
    ) -> Result<TransactionOutcome, SchedulingError> {
        check_scope(operations, scope)?;

        let tx = Transaction::new_unchecked(conn, options.mode.behavior())
            .map_err(DatabaseError::from)?;
        tracing::debug!(batch = options.label, scope = %scope, steps = operations.len(), "Transaction opened");

        let mut steps = Vec::with_capacity(operations.len());
        for (index, op) in operations.iter().enumerate() {
            match self.run_step(&tx, op) {
                Ok(step) => steps.push(step),
                Err(err) => {
                    tracing::warn!(
                        batch = options.label,
                        step = op.name(),
                        index,
                        error = %err,
                        "Atomic step failed, rolling back"
                    );
                    if let Err(rollback_err) = tx.rollback() {
                        tracing::error!(batch = options.label, error = %rollback_err, "Rollback failed");
                    }
                    return Err(err);
                }
            }
        }

        tx.commit().map_err(DatabaseError::from)?;
        tracing::debug!(batch = options.label, steps = steps.len(), "Transaction committed");

        Ok(TransactionOutcome {
            label: options.label,
            steps,
        })
    }

    fn run_step(&self, tx: &Transaction<'_>, op: &AtomicOperation) -> Result<StepResult, SchedulingError> {
        let step = op.name();
        let payload = match op {
            AtomicOperation::EnsureNoActiveAppointment { student_id } => {
                if let Some(existing) = db::find_active_appointment_for_student(tx, student_id)? {
                    return Err(SchedulingError::BusinessRule(format!(
                        "Student {student_id} already has a {} appointment",
                        existing.status
                    )));
                }
                StepPayload::Checked
            }
            AtomicOperation::EnsureNoPendingFollowUp { student_id } => {
                if db::find_pending_follow_up_for_student(tx, student_id)?.is_some() {
                    return Err(SchedulingError::BusinessRule(format!(
                        "Student {student_id} already has a pending follow-up session"
                    )));
                }
                StepPayload::Checked
            }
            AtomicOperation::EnsureDateNotPast { date, today } => {
                if date < today {
                    return Err(SchedulingError::BusinessRule(format!(
                        "Preferred date {date} is in the past"
                    )));
                }
                StepPayload::Checked
            }
            AtomicOperation::EnsureParentAppointment { parent_id, student_id } => {
                let parent = db::get_appointment(tx, parent_id)?
                    .ok_or_else(|| SchedulingError::not_found(EntityKind::Appointment, *parent_id))?;
                if &parent.student_id != student_id {
                    return Err(SchedulingError::BusinessRule(format!(
                        "Appointment {parent_id} does not belong to student {student_id}"
                    )));
                }
                StepPayload::Checked
            }
            AtomicOperation::CheckAvailability { scope, counselor, date, time, exclude_id } => {
                let slot = SlotRequest {
                    counselor,
                    date,
                    time: time.as_str(),
                    exclude_id: exclude_id.as_ref(),
                };
                conflict::ensure_available(tx, *scope, &slot)?;
                StepPayload::Checked
            }
            AtomicOperation::InsertAppointment(appt) => {
                db::insert_appointment(tx, appt).map_err(|e| match e {
                    DatabaseError::ConstraintViolation(detail) => {
                        tracing::debug!(detail = %detail, "Appointment insert hit constraint");
                        SchedulingError::BusinessRule(format!(
                            "Student {} already has an active appointment",
                            appt.student_id
                        ))
                    }
                    other => other.into(),
                })?;
                StepPayload::Inserted { id: appt.id }
            }
            AtomicOperation::InsertFollowUp { id, request, created_at } => {
                let sequence = next_sequence(tx, &request.parent_appointment_id)?;
                let session = FollowUpSession {
                    id: *id,
                    counselor_id: request.counselor_id.clone(),
                    student_id: request.student_id.clone(),
                    parent_appointment_id: request.parent_appointment_id,
                    follow_up_sequence: sequence,
                    preferred_date: request.preferred_date,
                    preferred_time: request.preferred_time.clone(),
                    consultation_type: request.consultation_type.clone(),
                    status: SessionStatus::Pending,
                    reason: None,
                    created_at: *created_at,
                    updated_at: *created_at,
                };
                db::insert_follow_up(tx, &session).map_err(|e| match e {
                    DatabaseError::ConstraintViolation(detail) if detail.contains("follow_up_sequence") => {
                        SchedulingError::BusinessRule(format!(
                            "Follow-up #{sequence} already exists for appointment {}",
                            request.parent_appointment_id
                        ))
                    }
                    DatabaseError::ConstraintViolation(detail) => {
                        tracing::debug!(detail = %detail, "Follow-up insert hit constraint");
                        SchedulingError::BusinessRule(format!(
                            "Student {} already has a pending follow-up session",
                            request.student_id
                        ))
                    }
                    other => other.into(),
                })?;
                StepPayload::FollowUpInserted { id: *id, sequence }
            }
            AtomicOperation::ValidateTransition { entity, id, requested } => {
                let current = transition::validate_stored_transition(tx, *entity, id, *requested)?;
                StepPayload::StatusValidated { current }
            }
            AtomicOperation::EnsureCancellable { entity, id } => {
                let current = transition::current_status(tx, *entity, id)?;
                if !current.is_active() {
                    return Err(SchedulingError::Validation(format!(
                        "{} is {current}; only pending or approved records may be cancelled",
                        entity.label()
                    )));
                }
                StepPayload::StatusValidated { current }
            }
            AtomicOperation::UpdateStatus { entity, id, status, reason, updated_at } => {
                let result = match entity {
                    EntityKind::Appointment => {
                        db::update_appointment_status(tx, id, *status, reason.as_deref(), updated_at)
                    }
                    EntityKind::FollowUp => {
                        db::update_follow_up_status(tx, id, *status, reason.as_deref(), updated_at)
                    }
                };
                result.map_err(|e| match e {
                    DatabaseError::NotFound { .. } => SchedulingError::not_found(*entity, *id),
                    other => other.into(),
                })?;
                StepPayload::StatusUpdated { id: *id, status: *status }
            }
            AtomicOperation::Notify { recipient, kind, entity, id, message, created_at } => {
                return Ok(self.notify_best_effort(tx, recipient, *kind, *entity, id, message, *created_at));
            }
            AtomicOperation::ReleaseCounselorSlot { entity, id } => {
                tracing::info!(entity = entity.as_str(), id = %id, "Counselor slot released");
                StepPayload::SlotReleased { id: *id }
            }
            AtomicOperation::PurgeTerminal { cutoff } => {
                let cutoff = cutoff.format(TIMESTAMP_FORMAT).to_string();
                let follow_ups = db::purge_terminal_follow_ups(tx, &cutoff)?;
                let appointments = db::purge_terminal_appointments(tx, &cutoff)?;
                StepPayload::Purged { appointments, follow_ups }
            }
        };

        Ok(StepResult {
            step,
            success: true,
            payload,
        })
    }

    /// Notification inside a savepoint. Failure rolls back the savepoint
    /// only and is reported as an unsuccessful step.
    #[allow(clippy::too_many_arguments)]
    fn notify_best_effort(
        &self,
        tx: &Transaction<'_>,
        recipient: &Recipient,
        kind: NotificationKind,
        entity: EntityKind,
        id: &Uuid,
        message: &str,
        created_at: NaiveDateTime,
    ) -> StepResult {
        let attempt = || -> Result<(), NotifyError> {
            let recipient_id = match recipient {
                Recipient::Explicit(r) => r.clone(),
                Recipient::StudentOf => student_of(tx, entity, id)?,
            };
            self.notifier.notify(tx, &NotificationRequest {
                recipient_id,
                kind,
                entity_kind: entity,
                entity_id: *id,
                message: message.to_string(),
                created_at,
            })
        };

        let result = tx
            .execute_batch("SAVEPOINT notify_step")
            .map_err(|e| NotifyError::Database(e.into()))
            .and_then(|_| match attempt() {
                Ok(()) => tx
                    .execute_batch("RELEASE notify_step")
                    .map_err(|e| NotifyError::Database(e.into())),
                Err(err) => {
                    if let Err(e) = tx.execute_batch("ROLLBACK TO notify_step; RELEASE notify_step") {
                        tracing::error!(error = %e, "Failed to roll back notification savepoint");
                    }
                    Err(err)
                }
            });

        match result {
            Ok(()) => StepResult {
                step: "notify",
                success: true,
                payload: StepPayload::Notified,
            },
            Err(err) => {
                tracing::warn!(
                    entity = entity.as_str(),
                    id = %id,
                    kind = kind.as_str(),
                    error = %err,
                    "Notification failed, continuing"
                );
                StepResult {
                    step: "notify",
                    success: false,
                    payload: StepPayload::NotificationSkipped { error: err.to_string() },
                }
            }
        }
    }
}

fn student_of(conn: &Connection, entity: EntityKind, id: &Uuid) -> Result<String, NotifyError> {
    let student = match entity {
        EntityKind::Appointment => db::get_appointment(conn, id)?.map(|a| a.student_id),
        EntityKind::FollowUp => db::get_follow_up(conn, id)?.map(|f| f.student_id),
    };
    student.ok_or_else(|| NotifyError::Rejected(format!("no recipient for {} {id}", entity.as_str())))
}

fn check_scope(operations: &[AtomicOperation], scope: &LockScope) -> Result<(), SchedulingError> {
    for op in operations {
        if let Some(table) = op.tables().into_iter().find(|t| !scope.contains(*t)) {
            return Err(SchedulingError::Validation(format!(
                "Step {} touches {} outside declared lock scope [{scope}]",
                op.name(),
                table.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::notification::SqliteNotifier;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn appointment(student: &str, time: &str) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            student_id: student.into(),
            counselor_preference: CounselorRef::counselor("C1"),
            preferred_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            preferred_time: time.into(),
            method_type: "in_person".into(),
            consultation_type: "individual".into(),
            purpose: "Stress".into(),
            status: SessionStatus::Pending,
            reason: None,
            created_at: ts("2025-03-01 09:00:00"),
            updated_at: ts("2025-03-01 09:00:00"),
        }
    }

    fn full_scope() -> LockScope {
        LockScope::new([
            Table::Appointments,
            Table::FollowUpSessions,
            Table::CounselorAvailability,
            Table::Notifications,
        ])
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, conn: &Connection, _request: &NotificationRequest) -> Result<(), NotifyError> {
            // Write something first so the savepoint has an effect to undo
            conn.execute(
                "INSERT INTO notifications (id, recipient_id, kind, entity_kind, entity_id, message)
                 VALUES ('n-partial', 'x', 'created', 'appointment', 'e', 'partial')",
                [],
            ).map_err(|e| NotifyError::Database(e.into()))?;
            Err(NotifyError::Rejected("mail relay offline".into()))
        }
    }

    #[test]
    fn successful_batch_commits_every_step() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let appt = appointment("s-1", "9:00 AM - 10:00 AM");
        let id = appt.id;

        let outcome = executor
            .execute(
                &conn,
                &[
                    AtomicOperation::EnsureNoActiveAppointment { student_id: "s-1".into() },
                    AtomicOperation::InsertAppointment(appt),
                    AtomicOperation::Notify {
                        recipient: Recipient::StudentOf,
                        kind: NotificationKind::Created,
                        entity: EntityKind::Appointment,
                        id,
                        message: "Request received".into(),
                        created_at: ts("2025-03-01 09:00:00"),
                    },
                ],
                &full_scope(),
                &ExecuteOptions::labeled("test_create"),
            )
            .unwrap();

        assert!(outcome.all_succeeded());
        assert_eq!(outcome.steps.len(), 3);
        assert_eq!(outcome.steps[1].payload, StepPayload::Inserted { id });
        assert!(db::get_appointment(&conn, &id).unwrap().is_some());
        assert_eq!(db::count_notifications_for_entity(&conn, &id).unwrap(), 1);
    }

    #[test]
    fn failing_step_rolls_back_earlier_writes() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let appt = appointment("s-1", "9:00 AM - 10:00 AM");
        let inserted = appt.id;

        let err = executor
            .execute(
                &conn,
                &[
                    AtomicOperation::InsertAppointment(appt),
                    AtomicOperation::UpdateStatus {
                        entity: EntityKind::Appointment,
                        id: Uuid::new_v4(),
                        status: SessionStatus::Approved,
                        reason: None,
                        updated_at: ts("2025-03-02 09:00:00"),
                    },
                ],
                &full_scope(),
                &ExecuteOptions::default(),
            )
            .unwrap_err();

        assert!(matches!(err, SchedulingError::NotFound { .. }));
        assert!(db::get_appointment(&conn, &inserted).unwrap().is_none());
        // Back in autocommit after rollback
        assert!(conn.is_autocommit());
    }

    #[test]
    fn step_outside_scope_rejected_before_any_write() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let appt = appointment("s-1", "9:00 AM - 10:00 AM");
        let id = appt.id;

        let err = executor
            .execute(
                &conn,
                &[
                    AtomicOperation::InsertAppointment(appt),
                    AtomicOperation::ReleaseCounselorSlot { entity: EntityKind::Appointment, id },
                ],
                &LockScope::new([Table::Appointments]),
                &ExecuteOptions::default(),
            )
            .unwrap_err();

        match err {
            SchedulingError::Validation(msg) => assert!(msg.contains("counselor_availability")),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(db::get_appointment(&conn, &id).unwrap().is_none());
    }

    #[test]
    fn notification_failure_does_not_abort_batch() {
        let conn = open_memory_database().unwrap();
        let notifier = FailingNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let appt = appointment("s-1", "9:00 AM - 10:00 AM");
        let id = appt.id;

        let outcome = executor
            .execute(
                &conn,
                &[
                    AtomicOperation::InsertAppointment(appt),
                    AtomicOperation::Notify {
                        recipient: Recipient::Explicit("C1".into()),
                        kind: NotificationKind::Created,
                        entity: EntityKind::Appointment,
                        id,
                        message: "New request".into(),
                        created_at: ts("2025-03-01 09:00:00"),
                    },
                ],
                &full_scope(),
                &ExecuteOptions::default(),
            )
            .unwrap();

        assert!(!outcome.all_succeeded());
        assert!(matches!(
            outcome.steps[1].payload,
            StepPayload::NotificationSkipped { .. }
        ));
        assert!(db::get_appointment(&conn, &id).unwrap().is_some());
        // Partial notification write undone by the savepoint
        let partial: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications WHERE id = 'n-partial'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(partial, 0);
    }

    #[test]
    fn past_date_is_business_rule_error() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);

        let err = executor
            .execute(
                &conn,
                &[AtomicOperation::EnsureDateNotPast {
                    date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
                    today: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                }],
                &LockScope::default(),
                &ExecuteOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, SchedulingError::BusinessRule(_)));
    }

    #[test]
    fn follow_up_insert_stamps_sequence() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let parent = appointment("s-1", "9:00 AM - 10:00 AM");
        let parent_id = parent.id;
        db::insert_appointment(&conn, &parent).unwrap();

        let request = NewFollowUp {
            counselor_id: CounselorRef::counselor("C1"),
            student_id: "s-1".into(),
            parent_appointment_id: parent_id,
            preferred_date: NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
            preferred_time: "10:00-11:00".into(),
            consultation_type: "individual".into(),
        };
        let outcome = executor
            .execute(
                &conn,
                &[AtomicOperation::InsertFollowUp {
                    id: Uuid::new_v4(),
                    request,
                    created_at: ts("2025-03-10 11:00:00"),
                }],
                &LockScope::new([Table::FollowUpSessions]),
                &ExecuteOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.follow_up_sequence(), Some(1));
    }

    #[test]
    fn lost_race_on_active_appointment_is_business_rule() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        db::insert_appointment(&conn, &appointment("s-1", "9:00 AM - 10:00 AM")).unwrap();

        // No pre-check step, so only the unique index can stop it
        let second = appointment("s-1", "1:00 PM - 2:00 PM");
        let second_id = second.id;
        let err = executor
            .execute(
                &conn,
                &[AtomicOperation::InsertAppointment(second)],
                &LockScope::new([Table::Appointments]),
                &ExecuteOptions::default(),
            )
            .unwrap_err();

        match err {
            SchedulingError::BusinessRule(msg) => assert!(msg.contains("already has an active appointment")),
            other => panic!("expected BusinessRule, got {other:?}"),
        }
        assert!(db::get_appointment(&conn, &second_id).unwrap().is_none());
        assert_eq!(db::list_appointments_for_student(&conn, "s-1").unwrap().len(), 1);
    }

    #[test]
    fn lost_race_on_pending_follow_up_is_business_rule() {
        let conn = open_memory_database().unwrap();
        let notifier = SqliteNotifier;
        let executor = AtomicExecutor::new(&notifier);
        let parent = appointment("s-1", "9:00 AM - 10:00 AM");
        let parent_id = parent.id;
        db::insert_appointment(&conn, &parent).unwrap();

        let insert = |time: &str| AtomicOperation::InsertFollowUp {
            id: Uuid::new_v4(),
            request: NewFollowUp {
                counselor_id: CounselorRef::counselor("C1"),
                student_id: "s-1".into(),
                parent_appointment_id: parent_id,
                preferred_date: NaiveDate::from_ymd_opt(2025, 3, 17).unwrap(),
                preferred_time: time.into(),
                consultation_type: "individual".into(),
            },
            created_at: ts("2025-03-10 11:00:00"),
        };
        let scope = LockScope::new([Table::FollowUpSessions]);
        executor
            .execute(&conn, &[insert("10:00-11:00")], &scope, &ExecuteOptions::default())
            .unwrap();

        let err = executor
            .execute(&conn, &[insert("13:00-14:00")], &scope, &ExecuteOptions::default())
            .unwrap_err();

        match err {
            SchedulingError::BusinessRule(msg) => assert!(msg.contains("already has a pending follow-up")),
            other => panic!("expected BusinessRule, got {other:?}"),
        }
        assert_eq!(db::list_follow_ups_for_parent(&conn, &parent_id).unwrap().len(), 1);
    }

    #[test]
    fn scope_display_lists_tables_in_order() {
        let scope = LockScope::new([Table::Notifications, Table::Appointments]);
        assert_eq!(scope.to_string(), "appointments, notifications");
        assert!(scope.contains(Table::Appointments));
        assert!(!scope.contains(Table::FollowUpSessions));
    }
}
