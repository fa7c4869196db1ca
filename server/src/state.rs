use std::sync::Arc;

use axum::extract::FromRef;

use mailminder::db::Database;
use mailminder::notify::NotificationDispatcher;
use mailminder::pipeline::Orchestrator;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub db: Database,
    pub orchestrator: Arc<Orchestrator>,
    pub dispatcher: NotificationDispatcher,
}

impl ServerState {
    pub fn new(db: Database, orchestrator: Orchestrator) -> Self {
        Self {
            dispatcher: NotificationDispatcher::new(db.clone()),
            orchestrator: Arc::new(orchestrator),
            db,
        }
    }
}
