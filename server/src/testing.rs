//! Fakes and helpers for driving the router in-process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

use mailminder::archive::LocalArchive;
use mailminder::config::Config;
use mailminder::db::Database;
use mailminder::extraction::{LanguageModel, ModelError};
use mailminder::mail::{MailBatch, MailError, MailSource, RawMessage};
use mailminder::pipeline::{Collaborators, Orchestrator, ProgressState};

use crate::routes::AppRouter;
use crate::state::ServerState;

/// Hands out its queued messages once. A hanging source never answers.
pub struct QueuedMail {
    queue: Mutex<Vec<RawMessage>>,
    hang: bool,
}

impl QueuedMail {
    pub fn with(messages: Vec<RawMessage>) -> Self {
        Self {
            queue: Mutex::new(messages),
            hang: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            hang: true,
        }
    }
}

#[async_trait]
impl MailSource for QueuedMail {
    fn name(&self) -> &str {
        "queued"
    }

    async fn list_new(&self, _since: Option<&str>) -> Result<MailBatch, MailError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        let messages = std::mem::take(&mut *self.queue.lock().unwrap());
        Ok(MailBatch {
            marker: Some(messages.len().to_string()),
            messages,
        })
    }
}

pub struct FixedModel(pub String);

#[async_trait]
impl LanguageModel for FixedModel {
    async fn complete(&self, _prompt: &str) -> Result<String, ModelError> {
        Ok(self.0.clone())
    }
}

pub fn message(id: &str, subject: &str) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        sender: "registrar@example.edu".to_string(),
        subject: subject.to_string(),
        body: "See the attached schedule.".to_string(),
        received_at: Utc::now(),
    }
}

pub fn orchestrator(db: &Database, mail: QueuedMail) -> Orchestrator {
    let reply = r#"{"summary":"Nothing to schedule","importance_score":2,"importance_reason":"none","events":[]}"#;
    Orchestrator::from_config(
        &Config::default(),
        db.clone(),
        Collaborators {
            mail: Arc::new(mail),
            model: Arc::new(FixedModel(reply.to_string())),
            archive: Arc::new(LocalArchive),
        },
    )
}

pub struct TestServer {
    pub db: Database,
    pub state: ServerState,
    pub router: Router,
}

impl TestServer {
    pub fn new(mail: QueuedMail) -> Self {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let state = ServerState::new(db.clone(), orchestrator(&db, mail));
        let router = AppRouter::create(state.clone(), true);
        Self { db, state, router }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str) -> Response {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Polls the registry until the task reaches a terminal status.
    pub async fn wait_for(&self, task_id: &str) -> ProgressState {
        for _ in 0..250 {
            if let Some(state) = self.state.orchestrator.progress().get(task_id) {
                if state.terminal {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {} did not finish", task_id);
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
