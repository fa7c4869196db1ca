//! Run lock repository: the `run_locks` table.
//!
//! A lock is a single row keyed by name. It can be taken when absent, when
//! it already belongs to the caller, or when its heartbeat is older than the
//! staleness cutoff.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// The holder recorded in a lock row.
#[derive(Debug, Clone, PartialEq)]
pub struct LockHolder {
    pub owner_id: String,
    pub task_id: String,
    pub kind: String,
    pub acquired_at: String,
    pub heartbeat_at: String,
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome {
    /// The lock was free (or re-entered by its owner).
    Acquired,
    /// A stale lock from another owner was taken over.
    TookOver { previous: LockHolder },
    /// Another live owner holds the lock.
    Held(LockHolder),
}

/// Request to take a lock.
#[derive(Debug, Clone)]
pub struct LockRequest<'a> {
    pub name: &'a str,
    pub owner_id: &'a str,
    pub task_id: &'a str,
    pub kind: &'a str,
    pub now: &'a str,
    /// Heartbeats older than this timestamp are stale.
    pub stale_before: &'a str,
}

/// Attempts to take the named lock in one transaction.
pub fn try_acquire(db: &Database, req: &LockRequest<'_>) -> Result<LockOutcome, DatabaseError> {
    db.with_tx(|conn| {
        let existing = conn
            .query_row(
                "SELECT owner_id, task_id, kind, acquired_at, heartbeat_at
                 FROM run_locks WHERE name = ?1",
                params![req.name],
                |row| {
                    Ok(LockHolder {
                        owner_id: row.get(0)?,
                        task_id: row.get(1)?,
                        kind: row.get(2)?,
                        acquired_at: row.get(3)?,
                        heartbeat_at: row.get(4)?,
                    })
                },
            )
            .optional()?;

        let outcome = match existing {
            None => LockOutcome::Acquired,
            Some(holder) if holder.owner_id == req.owner_id => LockOutcome::Acquired,
            Some(holder) if holder.heartbeat_at.as_str() < req.stale_before => {
                LockOutcome::TookOver { previous: holder }
            }
            Some(holder) => return Ok(LockOutcome::Held(holder)),
        };

        conn.execute(
            "INSERT INTO run_locks (name, owner_id, task_id, kind, acquired_at, heartbeat_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(name) DO UPDATE SET
                owner_id = excluded.owner_id,
                task_id = excluded.task_id,
                kind = excluded.kind,
                acquired_at = excluded.acquired_at,
                heartbeat_at = excluded.heartbeat_at",
            params![req.name, req.owner_id, req.task_id, req.kind, req.now],
        )?;

        Ok(outcome)
    })
}

/// Refreshes the heartbeat of a lock held by `owner_id` for `task_id`.
/// Returns false if the caller no longer holds the lock.
pub fn heartbeat(
    db: &Database,
    name: &str,
    owner_id: &str,
    task_id: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE run_locks SET heartbeat_at = ?4
             WHERE name = ?1 AND owner_id = ?2 AND task_id = ?3",
            params![name, owner_id, task_id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Releases a lock if it is still held by `owner_id` for `task_id`.
pub fn release(
    db: &Database,
    name: &str,
    owner_id: &str,
    task_id: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM run_locks WHERE name = ?1 AND owner_id = ?2 AND task_id = ?3",
            params![name, owner_id, task_id],
        )?;
        Ok(changed == 1)
    })
}

/// Returns the current holder of a lock, if any.
pub fn current(db: &Database, name: &str) -> Result<Option<LockHolder>, DatabaseError> {
    db.with_conn(|conn| {
        let holder = conn
            .query_row(
                "SELECT owner_id, task_id, kind, acquired_at, heartbeat_at
                 FROM run_locks WHERE name = ?1",
                params![name],
                |row| {
                    Ok(LockHolder {
                        owner_id: row.get(0)?,
                        task_id: row.get(1)?,
                        kind: row.get(2)?,
                        acquired_at: row.get(3)?,
                        heartbeat_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(holder)
    })
}
