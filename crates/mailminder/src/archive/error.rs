use thiserror::Error;

use crate::db::DatabaseError;

/// Failure of one call to the archive collaborator.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Archive call timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected archive response: {0}")]
    InvalidResponse(String),
}

impl ArchiveError {
    /// Network trouble, rate limiting and server errors may succeed on retry.
    /// Any other rejection will not.
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::Http(e) => e.is_timeout() || e.is_connect(),
            ArchiveError::Status { status, .. } => *status == 429 || *status >= 500,
            ArchiveError::Timeout(_) => true,
            ArchiveError::InvalidResponse(_) => false,
        }
    }
}

/// Failure of the sync stage for one message.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Archiving message '{message_id}' failed after {attempts} attempt(s): {source}")]
    Failed {
        message_id: String,
        attempts: u32,
        #[source]
        source: ArchiveError,
    },

    #[error("Message '{0}' not found")]
    MessageNotFound(String),

    #[error("Failed to encode archive payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
