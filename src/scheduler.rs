//! Entry point for scheduling operations.
//!
//! `Scheduler` holds configuration and the injected collaborators (notifier,
//! clock). Operations live in `appointment`, `follow_up` and `retention` as
//! further `impl Scheduler` blocks; each takes the caller's connection and
//! runs through the atomic executor.

use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::atomic::AtomicExecutor;
use crate::config::SchedulerConfig;
use crate::error::{OperationError, SchedulingError};
use crate::notification::{DisabledNotifier, Notifier, SqliteNotifier};
use crate::time_range::TimeRange;

/// Source of "today" for the past-date rule and of record timestamps.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> NaiveDateTime;
}

/// Local calendar date, UTC timestamps (matching SQLite `datetime('now')`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Frozen clock for tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: NaiveDateTime,
}

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.now.date()
    }

    fn now(&self) -> NaiveDateTime {
        self.now
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let notifier: Box<dyn Notifier> = if config.notifications_enabled {
            Box::new(SqliteNotifier)
        } else {
            Box::new(DisabledNotifier)
        };
        Self {
            config,
            notifier,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    pub(crate) fn executor(&self) -> AtomicExecutor<'_> {
        AtomicExecutor::new(&*self.notifier)
    }

    /// In strict mode a preferred time must parse as a range.
    pub(crate) fn check_time(&self, time: &str) -> Result<(), SchedulingError> {
        if self.config.strict_time_ranges {
            TimeRange::parse(time)?;
        }
        Ok(())
    }

    /// Run one public operation: log name, payload and outcome, and wrap a
    /// failure with the operation name.
    pub(crate) fn run<T, P>(
        &self,
        operation: &'static str,
        payload: &P,
        body: impl FnOnce() -> Result<T, SchedulingError>,
    ) -> Result<T, OperationError>
    where
        P: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(payload).unwrap_or_default();
        match body() {
            Ok(value) => {
                tracing::info!(operation, payload = %payload, success = true, "Scheduling operation completed");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(
                    operation,
                    payload = %payload,
                    success = false,
                    code = err.code(),
                    error = %err,
                    "Scheduling operation failed"
                );
                Err(OperationError::new(operation, err))
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Non-empty after trimming, else `Validation` naming the field.
pub(crate) fn require(field: &str, value: &str) -> Result<(), SchedulingError> {
    if value.trim().is_empty() {
        return Err(SchedulingError::Validation(format!("{field} is required")));
    }
    Ok(())
}
