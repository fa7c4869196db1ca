//! Triggering runs and following their progress.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use mailminder::pipeline::{Orchestrator, ProgressState, RunKind, TriggerOutcome};

use crate::error::{AppError, AppJsonResult, AppResult};

pub async fn trigger_check(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> AppResult<(StatusCode, Json<TriggerOutcome>)> {
    trigger(&orchestrator, RunKind::Check)
}

pub async fn trigger_reanalyze(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> AppResult<(StatusCode, Json<TriggerOutcome>)> {
    trigger(&orchestrator, RunKind::Reanalyze)
}

fn trigger(orchestrator: &Orchestrator, kind: RunKind) -> AppResult<(StatusCode, Json<TriggerOutcome>)> {
    let outcome = orchestrator.trigger(kind)?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

pub async fn progress(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(task_id): Path<String>,
) -> AppJsonResult<ProgressState> {
    orchestrator
        .progress()
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Task '{}' not found", task_id)))
}

/// Streams snapshots of one task as server-sent events, ending after the
/// terminal snapshot.
pub async fn events(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(task_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before reading the current snapshot so no update falls between.
    let receiver = orchestrator.progress().subscribe();
    let current = orchestrator
        .progress()
        .get(&task_id)
        .ok_or_else(|| AppError::NotFound(format!("Task '{}' not found", task_id)))?;

    let events = snapshots(task_id, current, receiver).map(|state| Ok(to_event(&state)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

struct Cursor {
    task_id: String,
    pending: Option<ProgressState>,
    receiver: broadcast::Receiver<ProgressState>,
    done: bool,
}

fn snapshots(
    task_id: String,
    current: ProgressState,
    receiver: broadcast::Receiver<ProgressState>,
) -> impl Stream<Item = ProgressState> {
    let cursor = Cursor {
        task_id,
        pending: Some(current),
        receiver,
        done: false,
    };

    stream::unfold(cursor, |mut cursor| async move {
        if cursor.done {
            return None;
        }
        if let Some(state) = cursor.pending.take() {
            cursor.done = state.terminal;
            return Some((state, cursor));
        }
        loop {
            match cursor.receiver.recv().await {
                Ok(state) if state.task_id == cursor.task_id => {
                    cursor.done = state.terminal;
                    return Some((state, cursor));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id = %cursor.task_id, skipped, "progress stream lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn to_event(state: &ProgressState) -> Event {
    let data = serde_json::to_string(state).unwrap_or_default();
    Event::default().event("progress").data(data)
}
