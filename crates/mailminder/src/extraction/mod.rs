//! Extraction stage: asks the language model for events and validates them.

pub mod error;
pub mod keywords;
pub mod model;
pub mod parse;
pub mod prompt;
pub mod stage;
pub mod tier;

use chrono::{DateTime, Utc};

pub use error::ExtractionError;
pub use keywords::{KeywordMatch, KeywordMatcher};
pub use model::{LanguageModel, ModelError, OpenAiCompatibleModel};
pub use stage::{Extractor, MessageInput};
pub use tier::{ImportanceScore, Tier};

/// A validated, time-bound event.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub importance: ImportanceScore,
}

impl ExtractedEvent {
    pub fn tier(&self) -> Tier {
        self.importance.tier()
    }
}

/// Everything extracted from one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub importance: ImportanceScore,
    pub importance_reason: String,
    pub events: Vec<ExtractedEvent>,
}
