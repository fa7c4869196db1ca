//! Builders for test inputs.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use mailminder::config::Config;
use mailminder::mail::RawMessage;

/// Builder for a fetched mail item.
pub struct MessageBuilder {
    message: RawMessage,
}

impl MessageBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            message: RawMessage {
                id: id.to_string(),
                sender: "registrar@example.edu".to_string(),
                subject: format!("Message {}", id),
                body: String::new(),
                received_at: Utc::now() - Duration::hours(1),
            },
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.message.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.message.body = body.to_string();
        self
    }

    pub fn build(self) -> RawMessage {
        self.message
    }
}

/// Formats a time the way the model is asked to.
pub fn model_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// A reply with one event at `start` lasting `duration`.
pub fn event_reply(title: &str, start: DateTime<Utc>, duration: &str, score: u8) -> String {
    json!({
        "summary": format!("{} scheduled", title),
        "importance_score": score,
        "importance_reason": "test",
        "events": [{
            "title": title,
            "start_time": model_time(start),
            "duration": duration,
            "location": "Room 101",
        }],
    })
    .to_string()
}

/// A reply without any time-bound event.
pub fn no_event_reply(score: u8) -> String {
    json!({
        "summary": "Nothing to schedule",
        "importance_score": score,
        "importance_reason": "no dates",
        "events": [],
    })
    .to_string()
}

/// Config tuned for fast tests: short timeouts and backoff, UTC times.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.model.timeout_secs = 1;
    config.archive.max_attempts = 2;
    config.archive.backoff_ms = 1;
    config.archive.timeout_secs = 5;
    config.pipeline.analyze_concurrency = 2;
    config.reminder.utc_offset_minutes = 0;
    config
}
