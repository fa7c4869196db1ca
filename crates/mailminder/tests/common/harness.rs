//! Test harness wiring an orchestrator to fakes and an on-disk database.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mailminder::config::Config;
use mailminder::db::Database;
use mailminder::pipeline::{Collaborators, Orchestrator, ProgressState, RunKind};

use super::builders::test_config;
use super::fakes::{FakeMailSource, RecordingArchive, Reply, ScriptedModel};

pub struct TestHarness {
    /// Keeps the database file alive for the test.
    _temp_dir: TempDir,
    pub db: Database,
    pub config: Config,
    pub mail: Arc<FakeMailSource>,
    pub model: Arc<ScriptedModel>,
    pub archive: Arc<RecordingArchive>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mail(FakeMailSource::new())
    }

    pub fn with_mail(mail: FakeMailSource) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("mailminder.db"))
            .expect("Failed to open test database");
        let config = test_config();
        let mail = Arc::new(mail);
        let model = Arc::new(ScriptedModel::new(Reply::Text(
            super::builders::no_event_reply(2),
        )));
        let archive = Arc::new(RecordingArchive::new());

        let orchestrator = Orchestrator::from_config(
            &config,
            db.clone(),
            Collaborators {
                mail: mail.clone(),
                model: model.clone(),
                archive: archive.clone(),
            },
        );

        Self {
            _temp_dir: temp_dir,
            db,
            config,
            mail,
            model,
            archive,
            orchestrator,
        }
    }

    /// A second process instance sharing this harness's database.
    pub fn second_process(&self) -> Orchestrator {
        Orchestrator::from_config(
            &self.config,
            self.db.clone(),
            Collaborators {
                mail: self.mail.clone(),
                model: self.model.clone(),
                archive: self.archive.clone(),
            },
        )
    }

    /// Triggers a run and waits for its terminal snapshot.
    pub async fn run(&self, kind: RunKind) -> ProgressState {
        let outcome = self.orchestrator.trigger(kind).expect("trigger failed");
        assert!(outcome.started, "a run was already active");
        self.wait_for(&outcome.task_id).await
    }

    pub async fn wait_for(&self, task_id: &str) -> ProgressState {
        for _ in 0..200 {
            if let Some(state) = self.orchestrator.progress().get(task_id) {
                if state.terminal {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("task {} did not finish", task_id);
    }
}
