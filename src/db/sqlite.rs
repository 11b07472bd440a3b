use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::DatabaseError;
use crate::config::SchedulerConfig;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path, config: &SchedulerConfig) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn)?;

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet). Any other
/// read failure, such as a locked database, is returned to the caller.
fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let has_table: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(0);
    }

    let version: Option<i64> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // schema_version + appointments + follow_up_sessions + notifications
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 4, "Expected 4 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Second run is a no-op
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn database_opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.db");
        let config = SchedulerConfig::default();
        let conn = open_database(&path, &config).unwrap();
        assert_eq!(count_tables(&conn).unwrap(), 4);
        drop(conn);

        // Re-open with migrations already applied
        let conn2 = open_database(&path, &config).unwrap();
        assert_eq!(count_tables(&conn2).unwrap(), 4);
    }

    #[test]
    fn fresh_database_reads_version_zero() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn locked_database_fails_without_rerunning_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.db");
        let holder = open_database(&path, &SchedulerConfig::default()).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let second = Connection::open(&path).unwrap();
        second.busy_timeout(Duration::ZERO).unwrap();
        let err = run_migrations(&second).unwrap_err();
        assert!(matches!(err, DatabaseError::Sqlite(_)), "got {err:?}");

        holder.execute_batch("ROLLBACK").unwrap();
        run_migrations(&second).unwrap();
        assert_eq!(get_current_version(&second).unwrap(), 1);
    }

    #[test]
    fn status_check_constraint_rejects_unknown_value() {
        let conn = open_memory_database().unwrap();
        let result = conn.execute(
            "INSERT INTO appointments (id, student_id, counselor_preference, preferred_date,
             preferred_time, method_type, consultation_type, purpose, status)
             VALUES ('a-1', 's-1', 'c-1', '2025-03-10', '9:00 AM - 10:00 AM',
                     'in_person', 'individual', 'Stress', 'archived')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn one_active_appointment_index_enforced() {
        let conn = open_memory_database().unwrap();
        let insert = |id: &str, status: &str| {
            conn.execute(
                "INSERT INTO appointments (id, student_id, counselor_preference, preferred_date,
                 preferred_time, method_type, consultation_type, purpose, status)
                 VALUES (?1, 's-1', 'c-1', '2025-03-10', '9:00 AM - 10:00 AM',
                         'in_person', 'individual', 'Stress', ?2)",
                rusqlite::params![id, status],
            )
        };
        assert!(insert("a-1", "completed").is_ok());
        assert!(insert("a-2", "pending").is_ok());
        let err = insert("a-3", "approved").unwrap_err();
        assert!(matches!(
            DatabaseError::from_write(err),
            DatabaseError::ConstraintViolation(_)
        ));
    }
}
