//! Polling and acknowledgment of due reminder deliveries.
//!
//! A delivery moves `pending -> sent -> acked`. A poll marks returned pending
//! deliveries as sent but keeps returning them until the client acks, so a
//! client that crashes before showing a notification will see it again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::db::delivery_repo::{self, DeliveryState, DueDeliveryRow};
use crate::db::{format_timestamp, Database, DatabaseError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Delivery '{0}' not found")]
    UnknownDelivery(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// What a polling client gets for one due reminder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryView {
    pub delivery_id: String,
    pub event_id: String,
    pub title: String,
    pub start_time: String,
    pub reminder_time: String,
    pub location: Option<String>,
    pub color: String,
    /// True if an earlier poll already returned this delivery.
    pub redelivered: bool,
}

impl From<DueDeliveryRow> for DeliveryView {
    fn from(row: DueDeliveryRow) -> Self {
        Self {
            redelivered: row.state == DeliveryState::Sent,
            delivery_id: row.id,
            event_id: row.event_id,
            title: row.title,
            start_time: row.start_time,
            reminder_time: row.reminder_time,
            location: row.location,
            color: row.color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AckOutcome {
    pub delivery_id: String,
    pub state: DeliveryState,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Database,
}

impl NotificationDispatcher {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Due deliveries that are not acked yet, earliest first.
    pub fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryView>, DispatchError> {
        let due = delivery_repo::take_due(&self.db, &format_timestamp(now))?;
        debug!(count = due.len(), "due deliveries");
        Ok(due.into_iter().map(DeliveryView::from).collect())
    }

    /// Acknowledges a delivery. Acking twice is fine.
    pub fn ack(&self, delivery_id: &str, now: DateTime<Utc>) -> Result<AckOutcome, DispatchError> {
        if !delivery_repo::ack(&self.db, delivery_id, &format_timestamp(now))? {
            return Err(DispatchError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(AckOutcome {
            delivery_id: delivery_id.to_string(),
            state: DeliveryState::Acked,
        })
    }
}
