//! What gets archived for one message.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::event_repo::EventRow;
use crate::db::message_repo::{MessageRow, MessageStatus};
use crate::extraction::{ImportanceScore, KeywordMatch, Tier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub importance_score: u8,
    pub tier: String,
}

impl From<&EventRow> for ArchivedEvent {
    fn from(row: &EventRow) -> Self {
        Self {
            title: row.title.clone(),
            description: row.description.clone(),
            location: row.location.clone(),
            start_time: row.start_time.clone(),
            end_time: row.end_time.clone(),
            importance_score: row.importance_score,
            tier: row.tier.clone(),
        }
    }
}

/// Message metadata, the model's analysis and the normalized events.
/// `events` may be empty: messages without a time are archived too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivePayload {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: String,
    pub status: MessageStatus,
    pub summary: Option<String>,
    pub importance_score: Option<u8>,
    pub importance_reason: Option<String>,
    pub error: Option<String>,
    pub keywords: Vec<KeywordMatch>,
    pub events: Vec<ArchivedEvent>,
}

impl ArchivePayload {
    pub fn from_rows(message: &MessageRow, events: &[EventRow]) -> Self {
        let keywords = serde_json::from_str(&message.keywords).unwrap_or_else(|e| {
            warn!("Unreadable keyword matches on message '{}': {}", message.id, e);
            Vec::new()
        });

        Self {
            message_id: message.id.clone(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at.clone(),
            status: message.status,
            summary: message.summary.clone(),
            importance_score: message.importance_score,
            importance_reason: message.importance_reason.clone(),
            error: message.error.clone(),
            keywords,
            events: events.iter().map(ArchivedEvent::from).collect(),
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        self.importance_score
            .and_then(|s| ImportanceScore::new(i64::from(s)))
            .map(|s| s.tier())
    }
}
