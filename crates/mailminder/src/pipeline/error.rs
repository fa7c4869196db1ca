use thiserror::Error;

use crate::db::DatabaseError;
use crate::mail::MailError;

/// Errors that end a run. Per-message failures never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Fetching mail failed: {0}")]
    Fetch(#[from] MailError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode keyword matches: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Pipeline run panicked")]
    Panicked,

    #[error("Another process is running task '{task_id}'")]
    Busy { task_id: String },
}
