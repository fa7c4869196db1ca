pub mod handlers;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::state::ServerState;

use handlers::{health, messages, notifications, tasks};

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState, cors_allow_any: bool) -> Router {
        let cors_layer = if cors_allow_any {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        };

        let api = Router::new()
            .route("/tasks/check", post(tasks::trigger_check))
            .route("/tasks/reanalyze", post(tasks::trigger_reanalyze))
            .route("/tasks/{task_id}/progress", get(tasks::progress))
            .route("/tasks/{task_id}/events", get(tasks::events))
            .route("/notifications", get(notifications::list_due))
            .route("/notifications/ack", post(notifications::ack))
            .route("/messages", get(messages::report));

        Router::new()
            .route("/health", get(health::health))
            .nest("/api", api)
            .fallback(handler_404)
            .layer(cors_layer)
            .with_state(state)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use mailminder::pipeline::RunKind;

    use crate::testing::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));
        let response = server.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));
        assert_eq!(server.get("/api/nope").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn check_runs_in_background_and_reports_progress() {
        let server = TestServer::new(QueuedMail::with(vec![
            message("m-1", "Club newsletter"),
            message("m-2", "Library hours"),
        ]));

        let response = server.post("/api/tasks/check").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let outcome = body_json(response).await;
        assert_eq!(outcome["started"], json!(true));
        let task_id = outcome["task_id"].as_str().unwrap().to_string();

        let finished = server.wait_for(&task_id).await;
        assert_eq!(finished.analyzed, 2);

        let response = server.get(&format!("/api/tasks/{}/progress", task_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let progress = body_json(response).await;
        assert_eq!(progress["status"], json!("done"));
        assert_eq!(progress["kind"], json!("check"));
        assert_eq!(progress["new_count"], json!(2));
        assert_eq!(progress["synced"], json!(2));
    }

    #[tokio::test]
    async fn unknown_task_progress_is_404() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));
        let response = server.get("/api/tasks/does-not-exist/progress").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!(404));

        let response = server.get("/api/tasks/does-not-exist/events").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_stream_ends_with_terminal_snapshot() {
        let server = TestServer::new(QueuedMail::with(vec![message("m-1", "Hello")]));
        let outcome = server.state.orchestrator.trigger(RunKind::Check).unwrap();
        server.wait_for(&outcome.task_id).await;

        let response = server
            .get(&format!("/api/tasks/{}/events", outcome.task_id))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("event: progress"));
        assert!(body.contains("\"terminal\":true"));
    }

    #[tokio::test]
    async fn run_held_by_another_process_is_409() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));
        let other = orchestrator(&server.db, QueuedMail::hanging());
        let held = other.trigger(RunKind::Check).unwrap();
        assert!(held.started);

        let response = server.post("/api/tasks/reanalyze").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], json!(409));
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains(&held.task_id));
    }

    #[tokio::test]
    async fn notifications_start_empty() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));
        let response = server.get("/api/notifications").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"notifications": []}));
    }

    #[tokio::test]
    async fn ack_validates_and_rejects_unknown_ids() {
        let server = TestServer::new(QueuedMail::with(Vec::new()));

        let response = server
            .post_json("/api/notifications/ack", json!({"delivery_id": "  "}))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = server
            .post_json("/api/notifications/ack", json!({"delivery_id": "m-1#0:1d"}))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn messages_report_filters_by_status() {
        let server = TestServer::new(QueuedMail::with(vec![message("m-1", "Hello")]));
        let outcome = server.state.orchestrator.trigger(RunKind::Check).unwrap();
        server.wait_for(&outcome.task_id).await;

        let body = body_json(server.get("/api/messages?status=analyzed").await).await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["id"], json!("m-1"));
        assert_eq!(messages[0]["archive_outcome"], json!("synced"));

        let body = body_json(server.get("/api/messages?status=failed").await).await;
        assert!(body["messages"].as_array().unwrap().is_empty());

        let response = server.get("/api/messages?status=bogus").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
