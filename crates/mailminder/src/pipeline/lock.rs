//! Cross-process mutual exclusion for pipeline runs, backed by `run_locks`.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::run_lock_repo::{self, LockHolder, LockOutcome, LockRequest};
use crate::db::{format_timestamp, message_repo, Database, DatabaseError};

use super::progress::RunKind;

pub const PIPELINE_LOCK: &str = "pipeline";

/// Error recorded on messages a dead run left in `analyzing`.
pub const INTERRUPTED_ERROR: &str = "interrupted by process restart";

pub enum Acquisition {
    Acquired(RunLease),
    Busy(LockHolder),
}

/// The pipeline lock as seen by one process instance.
#[derive(Clone)]
pub struct RunLock {
    db: Database,
    owner_id: String,
    ttl: Duration,
}

impl RunLock {
    pub fn new(db: Database, owner_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            db,
            owner_id: owner_id.into(),
            ttl,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Takes the lock for `task_id`. A stale holder is taken over, and the
    /// messages its run stranded in `analyzing` are failed so a re-analysis
    /// can pick them up.
    pub fn try_acquire(&self, task_id: &str, kind: RunKind) -> Result<Acquisition, DatabaseError> {
        let now = Utc::now();
        let stale_before = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or_default();
        let now = format_timestamp(now);
        let stale_before = format_timestamp(stale_before);

        let outcome = run_lock_repo::try_acquire(
            &self.db,
            &LockRequest {
                name: PIPELINE_LOCK,
                owner_id: &self.owner_id,
                task_id,
                kind: kind.as_str(),
                now: &now,
                stale_before: &stale_before,
            },
        )?;

        match outcome {
            LockOutcome::Held(holder) => Ok(Acquisition::Busy(holder)),
            LockOutcome::Acquired => Ok(Acquisition::Acquired(self.lease(task_id))),
            LockOutcome::TookOver { previous } => {
                warn!(
                    previous_owner = %previous.owner_id,
                    previous_task = %previous.task_id,
                    last_heartbeat = %previous.heartbeat_at,
                    "took over stale pipeline lock"
                );
                let stranded = message_repo::fail_stranded(&self.db, INTERRUPTED_ERROR, &now)?;
                if stranded > 0 {
                    info!("Marked {} interrupted messages as failed", stranded);
                }
                Ok(Acquisition::Acquired(self.lease(task_id)))
            }
        }
    }

    pub fn holder(&self) -> Result<Option<LockHolder>, DatabaseError> {
        run_lock_repo::current(&self.db, PIPELINE_LOCK)
    }

    fn lease(&self, task_id: &str) -> RunLease {
        RunLease {
            db: self.db.clone(),
            owner_id: self.owner_id.clone(),
            task_id: task_id.to_string(),
        }
    }
}

/// A held pipeline lock. Released when dropped.
pub struct RunLease {
    db: Database,
    owner_id: String,
    task_id: String,
}

impl RunLease {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Refreshes the heartbeat so other processes keep treating the lock as live.
    pub fn heartbeat(&self) {
        let now = format_timestamp(Utc::now());
        match run_lock_repo::heartbeat(&self.db, PIPELINE_LOCK, &self.owner_id, &self.task_id, &now) {
            Ok(true) => {}
            Ok(false) => warn!(task_id = %self.task_id, "pipeline lock is no longer held"),
            Err(e) => warn!(task_id = %self.task_id, "failed to refresh pipeline lock: {}", e),
        }
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let Err(e) = run_lock_repo::release(&self.db, PIPELINE_LOCK, &self.owner_id, &self.task_id) {
            warn!(task_id = %self.task_id, "failed to release pipeline lock: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::message_repo::{MessageRow, MessageStatus};

    fn lock(db: &Database, owner: &str, ttl_secs: u64) -> RunLock {
        RunLock::new(db.clone(), owner, Duration::from_secs(ttl_secs))
    }

    #[test]
    fn test_second_owner_is_refused() {
        let db = Database::open_in_memory().unwrap();
        let first = lock(&db, "proc-a", 300);
        let second = lock(&db, "proc-b", 300);

        let lease = match first.try_acquire("t1", RunKind::Check).unwrap() {
            Acquisition::Acquired(lease) => lease,
            Acquisition::Busy(_) => panic!("lock should be free"),
        };
        match second.try_acquire("t2", RunKind::Check).unwrap() {
            Acquisition::Busy(holder) => assert_eq!(holder.task_id, "t1"),
            Acquisition::Acquired(_) => panic!("lock should be held"),
        }

        drop(lease);
        assert!(first.holder().unwrap().is_none());
        assert!(matches!(
            second.try_acquire("t2", RunKind::Check).unwrap(),
            Acquisition::Acquired(_)
        ));
    }

    #[test]
    fn test_stale_lock_takeover_fails_stranded_messages() {
        let db = Database::open_in_memory().unwrap();
        let now = "2024-05-01T00:00:00Z";
        message_repo::insert_if_absent(
            &db,
            &MessageRow {
                id: "m1".to_string(),
                sender: String::new(),
                subject: String::new(),
                body: String::new(),
                received_at: now.to_string(),
                keywords: "[]".to_string(),
                status: MessageStatus::Unprocessed,
                summary: None,
                importance_score: None,
                importance_reason: None,
                error: None,
                created_at: now.to_string(),
                updated_at: now.to_string(),
            },
        )
        .unwrap();
        message_repo::transition(&db, "m1", &[MessageStatus::Unprocessed], MessageStatus::Analyzing, now)
            .unwrap();

        // A crashed process left an old heartbeat behind.
        run_lock_repo::try_acquire(
            &db,
            &LockRequest {
                name: PIPELINE_LOCK,
                owner_id: "dead",
                task_id: "t0",
                kind: "check",
                now,
                stale_before: now,
            },
        )
        .unwrap();

        let live = lock(&db, "proc-b", 60);
        assert!(matches!(
            live.try_acquire("t1", RunKind::Reanalyze).unwrap(),
            Acquisition::Acquired(_)
        ));

        let message = message_repo::find_by_id(&db, "m1").unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
        assert_eq!(message.error.as_deref(), Some(INTERRUPTED_ERROR));
    }
}
