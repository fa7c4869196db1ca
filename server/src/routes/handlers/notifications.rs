use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use mailminder::notify::{AckOutcome, DeliveryView, NotificationDispatcher};

use crate::error::{AppError, AppJsonResult};

#[derive(Serialize)]
pub struct NotificationsResponse {
    notifications: Vec<DeliveryView>,
}

#[derive(Deserialize)]
pub struct AckRequest {
    delivery_id: String,
}

pub async fn list_due(
    State(dispatcher): State<NotificationDispatcher>,
) -> AppJsonResult<NotificationsResponse> {
    let notifications = dispatcher.list_due(Utc::now())?;
    Ok(Json(NotificationsResponse { notifications }))
}

pub async fn ack(
    State(dispatcher): State<NotificationDispatcher>,
    Json(request): Json<AckRequest>,
) -> AppJsonResult<AckOutcome> {
    let delivery_id = request.delivery_id.trim();
    if delivery_id.is_empty() {
        return Err(AppError::BadRequest("delivery_id is required".to_string()));
    }
    Ok(Json(dispatcher.ack(delivery_id, Utc::now())?))
}
