//! Purge of long-finished scheduling records.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::atomic::{AtomicOperation, ExecuteOptions, LockScope, Table};
use crate::error::{OperationError, SchedulingError};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub cutoff: NaiveDateTime,
    pub appointments_deleted: usize,
    pub follow_ups_deleted: usize,
}

impl Scheduler {
    /// Delete terminal records untouched for `older_than_days`. Appointments
    /// that still anchor a surviving follow-up are kept.
    pub fn purge_terminal(
        &self,
        conn: &Connection,
        older_than_days: u32,
    ) -> Result<PurgeReport, OperationError> {
        let payload = json!({ "older_than_days": older_than_days });
        self.run("purge terminal records", &payload, || {
            let cutoff = Duration::try_days(i64::from(older_than_days))
                .and_then(|window| self.clock().now().checked_sub_signed(window))
                .ok_or_else(|| {
                    SchedulingError::Validation(format!(
                        "Retention window of {older_than_days} days is out of range"
                    ))
                })?;

            let outcome = self.executor().execute(
                conn,
                &[AtomicOperation::PurgeTerminal { cutoff }],
                &LockScope::new([Table::Appointments, Table::FollowUpSessions]),
                &ExecuteOptions::labeled("purge_terminal"),
            )?;

            let (appointments_deleted, follow_ups_deleted) = outcome.purged().unwrap_or((0, 0));
            tracing::info!(
                cutoff = %cutoff,
                appointments_deleted,
                follow_ups_deleted,
                "Retention purge finished"
            );
            Ok(PurgeReport {
                cutoff,
                appointments_deleted,
                follow_ups_deleted,
            })
        })
    }

    /// `purge_terminal` with the configured retention window.
    pub fn purge_expired(&self, conn: &Connection) -> Result<PurgeReport, OperationError> {
        self.purge_terminal(conn, self.config().retention_days)
    }
}
