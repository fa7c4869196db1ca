use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tracing::debug;

use crate::config::{ModelConfig, ReminderConfig};

use super::error::ExtractionError;
use super::keywords::KeywordMatch;
use super::model::LanguageModel;
use super::parse::parse_analysis;
use super::prompt::build_prompt;
use super::Analysis;

/// The parts of a stored message the model sees.
#[derive(Debug, Clone, Copy)]
pub struct MessageInput<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub keywords: &'a [KeywordMatch],
}

/// Runs one model call per message and validates the reply.
pub struct Extractor {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_body_chars: usize,
    offset: FixedOffset,
}

impl Extractor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
        max_body_chars: usize,
        offset: FixedOffset,
    ) -> Self {
        Self {
            model,
            timeout,
            max_body_chars,
            offset,
        }
    }

    pub fn from_config(
        model: Arc<dyn LanguageModel>,
        model_config: &ModelConfig,
        reminder_config: &ReminderConfig,
    ) -> Self {
        Self::new(
            model,
            Duration::from_secs(model_config.timeout_secs),
            model_config.max_body_chars,
            local_offset(reminder_config.utc_offset_minutes),
        )
    }

    /// Extracts events from a message. A call exceeding the timeout fails.
    pub async fn extract(&self, input: &MessageInput<'_>) -> Result<Analysis, ExtractionError> {
        let prompt = build_prompt(input.subject, input.body, input.keywords, self.max_body_chars);

        let reply = tokio::time::timeout(self.timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))??;
        debug!(chars = reply.len(), "model replied");

        parse_analysis(&reply, self.offset)
    }
}

/// Offset used for times the model gives without a timezone.
pub fn local_offset(utc_offset_minutes: i32) -> FixedOffset {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}
