//! Live progress of pipeline runs.
//!
//! A [`ProgressRegistry`] keeps the latest snapshot of every run in a TTL
//! cache (refreshed on every update) and broadcasts each snapshot to
//! subscribers. The running worker owns the only [`TaskProgress`] for its
//! task; pollers only ever read snapshots.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

const MAX_RETAINED_TASKS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Starting,
    Fetching,
    Saving,
    Analyzing,
    Syncing,
    Done,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Fetch new mail, then save, analyze and sync.
    Check,
    /// Analyze and sync failed or unprocessed messages only.
    Reanalyze,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Check => "check",
            RunKind::Reanalyze => "reanalyze",
        }
    }
}

/// Snapshot of one run as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub task_id: String,
    pub kind: RunKind,
    pub status: TaskStatus,
    pub new_count: u32,
    pub saved: u32,
    pub total: u32,
    pub analyzed: u32,
    pub failed: u32,
    pub synced: u32,
    pub sync_failed: u32,
    pub message: String,
    pub terminal: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressState {
    fn new(task_id: &str, kind: RunKind) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            kind,
            status: TaskStatus::Starting,
            new_count: 0,
            saved: 0,
            total: 0,
            analyzed: 0,
            failed: 0,
            synced: 0,
            sync_failed: 0,
            message: "Starting".to_string(),
            terminal: false,
            started_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone)]
pub struct ProgressRegistry {
    snapshots: Cache<String, ProgressState>,
    sender: Arc<broadcast::Sender<ProgressState>>,
}

impl ProgressRegistry {
    pub fn new(retention: Duration) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            snapshots: Cache::builder()
                .max_capacity(MAX_RETAINED_TASKS)
                .time_to_live(retention)
                .build(),
            sender: Arc::new(sender),
        }
    }

    /// Registers a new run and returns the handle that updates it.
    pub fn start(&self, task_id: &str, kind: RunKind) -> TaskProgress {
        let state = ProgressState::new(task_id, kind);
        self.publish(state.clone());
        TaskProgress {
            registry: self.clone(),
            state: Mutex::new(state),
        }
    }

    /// Latest snapshot of a task, or `None` once it has been evicted.
    pub fn get(&self, task_id: &str) -> Option<ProgressState> {
        self.snapshots.get(task_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressState> {
        self.sender.subscribe()
    }

    fn publish(&self, state: ProgressState) {
        self.snapshots.insert(state.task_id.clone(), state.clone());
        // No subscribers is fine.
        let _ = self.sender.send(state);
    }
}

/// Write handle for one run. Counters only grow, and nothing changes after
/// a terminal status. Dropping the handle before the run is terminal
/// publishes an `error` snapshot.
pub struct TaskProgress {
    registry: ProgressRegistry,
    state: Mutex<ProgressState>,
}

impl TaskProgress {
    pub fn task_id(&self) -> String {
        self.snapshot().task_id
    }

    pub fn snapshot(&self) -> ProgressState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ProgressState)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.terminal {
                return;
            }
            f(&mut state);
            state.terminal = state.status.is_terminal();
            state.updated_at = Utc::now();
            state.clone()
        };
        self.registry.publish(snapshot);
    }

    pub fn stage(&self, status: TaskStatus, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| {
            s.status = status;
            s.message = message;
        });
    }

    pub fn set_new_count(&self, count: u32) {
        self.update(|s| s.new_count = s.new_count.max(count));
    }

    pub fn set_total(&self, total: u32) {
        self.update(|s| s.total = s.total.max(total));
    }

    pub fn record_saved(&self) {
        self.update(|s| s.saved = (s.saved + 1).min(s.new_count));
    }

    pub fn record_analyzed(&self) {
        self.update(|s| {
            if s.analyzed + s.failed < s.total {
                s.analyzed += 1;
            }
        });
    }

    pub fn record_failed(&self) {
        self.update(|s| {
            if s.analyzed + s.failed < s.total {
                s.failed += 1;
            }
        });
    }

    pub fn record_synced(&self) {
        self.update(|s| s.synced = (s.synced + 1).min(s.total));
    }

    pub fn record_sync_failed(&self) {
        self.update(|s| s.sync_failed += 1);
    }

    pub fn finish(&self, message: impl Into<String>) {
        self.stage(TaskStatus::Done, message);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.stage(TaskStatus::Error, message);
    }

    pub fn is_terminal(&self) -> bool {
        self.snapshot().terminal
    }
}

impl Drop for TaskProgress {
    fn drop(&mut self) {
        if !self.is_terminal() {
            warn!(task_id = %self.task_id(), "task dropped before reaching a terminal status");
            self.fail("worker exited unexpectedly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProgressRegistry {
        ProgressRegistry::new(Duration::from_secs(60))
    }

    #[test]
    fn test_start_publishes_snapshot() {
        let registry = registry();
        let progress = registry.start("t1", RunKind::Check);
        let state = registry.get("t1").unwrap();
        assert_eq!(state.status, TaskStatus::Starting);
        assert_eq!(state.kind, RunKind::Check);
        assert!(!state.terminal);
        progress.finish("done");
    }

    #[test]
    fn test_counters_keep_invariants() {
        let registry = registry();
        let progress = registry.start("t1", RunKind::Check);

        // Saving more than was fetched never pushes saved past new_count.
        progress.set_new_count(2);
        progress.record_saved();
        progress.record_saved();
        progress.record_saved();
        assert_eq!(registry.get("t1").unwrap().saved, 2);

        progress.set_total(2);
        progress.record_analyzed();
        progress.record_failed();
        progress.record_failed();
        let state = registry.get("t1").unwrap();
        assert_eq!((state.analyzed, state.failed), (1, 1));

        progress.record_synced();
        progress.record_synced();
        progress.record_synced();
        assert_eq!(registry.get("t1").unwrap().synced, 2);
        progress.finish("done");
    }

    #[test]
    fn test_terminal_state_is_final() {
        let registry = registry();
        let progress = registry.start("t1", RunKind::Check);
        progress.finish("Checked 0 messages");
        progress.stage(TaskStatus::Analyzing, "late update");
        progress.fail("late failure");

        let state = registry.get("t1").unwrap();
        assert_eq!(state.status, TaskStatus::Done);
        assert!(state.terminal);
        assert_eq!(state.message, "Checked 0 messages");
    }

    #[test]
    fn test_drop_without_terminal_publishes_error() {
        let registry = registry();
        {
            let progress = registry.start("t1", RunKind::Reanalyze);
            progress.stage(TaskStatus::Analyzing, "Analyzing");
        }
        let state = registry.get("t1").unwrap();
        assert_eq!(state.status, TaskStatus::Error);
        assert_eq!(state.message, "worker exited unexpectedly");
    }

    #[tokio::test]
    async fn test_subscribers_see_every_snapshot() {
        let registry = registry();
        let mut rx = registry.subscribe();
        let progress = registry.start("t1", RunKind::Check);
        progress.stage(TaskStatus::Fetching, "Fetching");
        progress.finish("done");

        let statuses: Vec<TaskStatus> = (0..3).map(|_| rx.try_recv().unwrap().status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Starting, TaskStatus::Fetching, TaskStatus::Done]
        );
    }

    #[test]
    fn test_unknown_task() {
        assert!(registry().get("missing").is_none());
    }
}
