//! Archive record repository: rows for the `archive_records` table.
//!
//! One row per message. A failed sync only updates the outcome columns and
//! never touches `remote_ref`, so a previously created remote record keeps
//! being targeted by later updates.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw archive record from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecordRow {
    pub message_id: String,
    pub remote_ref: Option<String>,
    pub url: Option<String>,
    pub last_outcome: String,
    pub last_error: Option<String>,
    pub attempts: u32,
    pub payload: Option<String>,
    pub synced_at: Option<String>,
    pub updated_at: String,
}

impl ArchiveRecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            message_id: row.get("message_id")?,
            remote_ref: row.get("remote_ref")?,
            url: row.get("url")?,
            last_outcome: row.get("last_outcome")?,
            last_error: row.get("last_error")?,
            attempts: row.get("attempts")?,
            payload: row.get("payload")?,
            synced_at: row.get("synced_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Finds the archive record of a message.
pub fn find_by_message(
    db: &Database,
    message_id: &str,
) -> Result<Option<ArchiveRecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM archive_records WHERE message_id = ?1")?;
        let mut rows = stmt.query_map(params![message_id], ArchiveRecordRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Records a successful sync with the reference returned by the archive.
pub fn record_success(
    db: &Database,
    message_id: &str,
    remote_ref: &str,
    url: Option<&str>,
    attempts: u32,
    payload: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO archive_records (message_id, remote_ref, url, last_outcome, last_error,
             attempts, payload, synced_at, updated_at)
             VALUES (?1, ?2, ?3, 'synced', NULL, ?4, ?5, ?6, ?6)
             ON CONFLICT(message_id) DO UPDATE SET
                remote_ref = excluded.remote_ref,
                url = COALESCE(excluded.url, archive_records.url),
                last_outcome = 'synced',
                last_error = NULL,
                attempts = excluded.attempts,
                payload = excluded.payload,
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at",
            params![message_id, remote_ref, url, attempts, payload, now],
        )?;
        Ok(())
    })
}

/// Records a failed sync. Any stored reference is left unchanged.
pub fn record_failure(
    db: &Database,
    message_id: &str,
    error: &str,
    attempts: u32,
    payload: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO archive_records (message_id, remote_ref, url, last_outcome, last_error,
             attempts, payload, synced_at, updated_at)
             VALUES (?1, NULL, NULL, 'failed', ?2, ?3, ?4, NULL, ?5)
             ON CONFLICT(message_id) DO UPDATE SET
                last_outcome = 'failed',
                last_error = excluded.last_error,
                attempts = excluded.attempts,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![message_id, error, attempts, payload, now],
        )?;
        Ok(())
    })
}
