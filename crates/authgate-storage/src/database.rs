//! Persisted security state
//!
//! Holds the one last-known enrollment snapshot across process restarts. The
//! snapshot is a fingerprint, not a secret, so the file is plain SQLite.

use crate::{migrations, Error, Result};
use authgate_core::{DomainState, EnrollmentSnapshot, SnapshotPersistence};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// State database connection wrapper
pub struct StateDatabase {
    conn: Mutex<Connection>,
}

impl StateDatabase {
    /// Open (creating if needed) and migrate
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        tracing::debug!("Opened state database at {}", path.display());
        Self::init(conn)
    }

    /// In-memory database for tests and ephemeral sessions
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Last-known enrollment snapshot
    pub fn load_enrollment_snapshot(&self) -> Result<Option<EnrollmentSnapshot>> {
        let row: Option<(Vec<u8>, i64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT domain_state, captured_at FROM enrollment_snapshot WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(state, captured_at)| {
            let captured_at = Utc
                .timestamp_millis_opt(captured_at)
                .single()
                .ok_or_else(|| Error::Validation(format!("invalid timestamp {}", captured_at)))?;
            Ok(EnrollmentSnapshot::with_timestamp(
                DomainState::new(state),
                captured_at,
            ))
        })
        .transpose()
    }

    /// Replace the last-known enrollment snapshot
    pub fn save_enrollment_snapshot(&self, snapshot: &EnrollmentSnapshot) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO enrollment_snapshot (id, domain_state, captured_at)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                domain_state = excluded.domain_state,
                captured_at = excluded.captured_at",
            params![
                snapshot.state.as_bytes(),
                snapshot.captured_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Forget the last-known snapshot; the next observation becomes the baseline
    pub fn clear_enrollment_snapshot(&self) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM enrollment_snapshot", [])?;
        Ok(())
    }
}

impl SnapshotPersistence for StateDatabase {
    fn load(&self) -> authgate_core::Result<Option<EnrollmentSnapshot>> {
        self.load_enrollment_snapshot().map_err(Into::into)
    }

    fn save(&self, snapshot: &EnrollmentSnapshot) -> authgate_core::Result<()> {
        self.save_enrollment_snapshot(snapshot).map_err(Into::into)
    }
}
