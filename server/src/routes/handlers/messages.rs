//! Reporting view over stored messages, so item-level failures are visible.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use mailminder::db::message_repo::{self, MessageFilter, MessageReportRow, MessageStatus};
use mailminder::db::Database;

use crate::error::{AppError, AppJsonResult};

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

#[derive(Deserialize)]
pub struct ReportQuery {
    status: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
pub struct ReportResponse {
    messages: Vec<MessageReportRow>,
}

pub async fn report(
    State(db): State<Database>,
    Query(query): Query<ReportQuery>,
) -> AppJsonResult<ReportResponse> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(value) => Some(
            MessageStatus::parse(value)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown status '{}'", value)))?,
        ),
        None => None,
    };
    let filter = MessageFilter {
        status,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
    };

    let messages = message_repo::report(&db, &filter)?;
    Ok(Json(ReportResponse { messages }))
}
