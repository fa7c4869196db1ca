//! Starts pipeline runs in the background and enforces one run at a time.
//!
//! Within the process, a second trigger while a run is active returns the
//! active task id. Across processes, the `run_locks` record decides.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::db::Database;

use super::error::PipelineError;
use super::lock::{Acquisition, RunLock};
use super::progress::{ProgressRegistry, RunKind};
use super::runner::{Collaborators, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub task_id: String,
    /// False when the task id of an already active run was returned.
    pub started: bool,
}

#[derive(Debug, Clone)]
struct ActiveRun {
    task_id: String,
    kind: RunKind,
}

/// Clears the active-run slot when the worker exits, however it exits.
struct ActiveGuard {
    slot: Arc<Mutex<Option<ActiveRun>>>,
    task_id: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.as_ref().is_some_and(|run| run.task_id == self.task_id) {
            *slot = None;
        }
    }
}

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    progress: ProgressRegistry,
    lock: RunLock,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<Pipeline>, progress: ProgressRegistry, lock: RunLock) -> Self {
        Self {
            pipeline,
            progress,
            lock,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Wires a pipeline, progress registry and run lock from configuration.
    /// Each call gets a fresh lock owner id.
    pub fn from_config(config: &Config, db: Database, collaborators: Collaborators) -> Self {
        let pipeline = Pipeline::from_config(config, db.clone(), collaborators);
        let progress =
            ProgressRegistry::new(Duration::from_secs(config.pipeline.progress_retention_secs));
        let lock = RunLock::new(
            db,
            Uuid::new_v4().to_string(),
            Duration::from_secs(config.pipeline.lock_ttl_secs),
        );
        Self::new(Arc::new(pipeline), progress, lock)
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    /// Task id and kind of the run this process is executing, if any.
    pub fn active_run(&self) -> Option<(String, RunKind)> {
        self.lock_active()
            .as_ref()
            .map(|run| (run.task_id.clone(), run.kind))
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        match self.active.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Starts a run in the background and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, kind: RunKind) -> Result<TriggerOutcome, PipelineError> {
        let mut slot = self.lock_active();
        if let Some(run) = slot.as_ref() {
            info!(task_id = %run.task_id, "run already active; not starting another");
            return Ok(TriggerOutcome {
                task_id: run.task_id.clone(),
                started: false,
            });
        }

        let task_id = Uuid::new_v4().to_string();
        let lease = match self.lock.try_acquire(&task_id, kind)? {
            Acquisition::Acquired(lease) => lease,
            Acquisition::Busy(holder) => {
                return Err(PipelineError::Busy {
                    task_id: holder.task_id,
                })
            }
        };

        *slot = Some(ActiveRun {
            task_id: task_id.clone(),
            kind,
        });
        drop(slot);

        let guard = ActiveGuard {
            slot: self.active.clone(),
            task_id: task_id.clone(),
        };
        let progress = self.progress.start(&task_id, kind);
        let pipeline = self.pipeline.clone();
        let span = info_span!("run", task_id = %task_id, kind = kind.as_str());

        tokio::spawn(
            async move {
                info!("pipeline run started");
                let result = AssertUnwindSafe(pipeline.run(kind, &progress, &lease))
                    .catch_unwind()
                    .await
                    .unwrap_or(Err(PipelineError::Panicked));

                // Messages still claimed would otherwise stay in analysis until
                // the lock goes stale.
                if let Err(e) = &result {
                    match pipeline.fail_claimed(&e.to_string()) {
                        Ok(0) => {}
                        Ok(count) => warn!(count, "failed messages claimed by the aborted run"),
                        Err(e) => error!("could not release claimed messages: {}", e),
                    }
                }

                // Free the lock and the slot before the terminal snapshot, so a
                // client reacting to it can start the next run right away.
                drop(lease);
                drop(guard);

                match result {
                    Ok(summary) => {
                        let message = summary.describe(kind);
                        info!("{}", message);
                        progress.finish(message);
                    }
                    Err(e) => {
                        error!("pipeline run failed: {}", e);
                        progress.fail(e.to_string());
                    }
                }
            }
            .instrument(span),
        );

        Ok(TriggerOutcome {
            task_id,
            started: true,
        })
    }
}
