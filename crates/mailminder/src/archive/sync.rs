//! Archive sync stage: mirrors a processed message to the archive sink.
//!
//! A message that already has a remote reference is updated in place. Each
//! call carries a timeout; transient failures are retried with exponential
//! backoff up to `max_attempts`. The outcome is recorded in
//! `archive_records` either way, and a failure never touches the message's
//! analysis status or its stored reference.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::ArchiveConfig;
use crate::db::event_repo::EventRow;
use crate::db::message_repo::MessageRow;
use crate::db::{archive_repo, format_timestamp, Database};

use super::error::{ArchiveError, SyncError};
use super::payload::ArchivePayload;
use super::{ArchiveRef, ArchiveSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }
}

pub struct ArchiveSync {
    db: Database,
    sink: Arc<dyn ArchiveSink>,
    policy: RetryPolicy,
}

impl ArchiveSync {
    pub fn new(db: Database, sink: Arc<dyn ArchiveSink>, policy: RetryPolicy) -> Self {
        Self { db, sink, policy }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Archives one message with its events (possibly none).
    pub async fn sync(
        &self,
        message: &MessageRow,
        events: &[EventRow],
    ) -> Result<ArchiveRef, SyncError> {
        let payload = ArchivePayload::from_rows(message, events);
        let payload_json = serde_json::to_string(&payload)?;
        let existing = archive_repo::find_by_message(&self.db, &message.id)?
            .and_then(|record| record.remote_ref);

        let (attempts, result) = self.upsert_with_retry(existing.as_deref(), &payload).await;
        let now = format_timestamp(Utc::now());

        match result {
            Ok(reference) => {
                archive_repo::record_success(
                    &self.db,
                    &message.id,
                    &reference.id,
                    reference.url.as_deref(),
                    attempts,
                    &payload_json,
                    &now,
                )?;
                debug!(
                    message_id = %message.id,
                    remote_ref = %reference.id,
                    attempts,
                    "archived message"
                );
                Ok(reference)
            }
            Err(e) => {
                archive_repo::record_failure(
                    &self.db,
                    &message.id,
                    &e.to_string(),
                    attempts,
                    &payload_json,
                    &now,
                )?;
                Err(SyncError::Failed {
                    message_id: message.id.clone(),
                    attempts,
                    source: e,
                })
            }
        }
    }

    async fn upsert_with_retry(
        &self,
        existing: Option<&str>,
        payload: &ArchivePayload,
    ) -> (u32, Result<ArchiveRef, ArchiveError>) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.policy.timeout, self.sink.upsert(existing, payload))
                .await
                .unwrap_or_else(|_| Err(ArchiveError::Timeout(self.policy.timeout.as_secs())));

            match result {
                Ok(reference) => return (attempt, Ok(reference)),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        message_id = %payload.message_id,
                        attempt,
                        "archive call failed: {}; retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (attempt, Err(e)),
            }
        }
    }
}
