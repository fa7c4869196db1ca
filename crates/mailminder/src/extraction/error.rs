use thiserror::Error;

use super::model::ModelError;

/// Why a message's analysis failed. Every variant marks the message `failed`.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("Model call timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Importance score out of range 1-10: {0}")]
    InvalidImportance(String),

    #[error("Unparseable {field} '{value}'")]
    InvalidTime { field: &'static str, value: String },

    #[error("Event '{title}' ends before it starts")]
    EndBeforeStart { title: String },
}
