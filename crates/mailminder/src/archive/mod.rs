//! Archive sync: mirrors every processed message to an external knowledge base.

pub mod error;
pub mod local;
pub mod notion;
pub mod payload;
pub mod sync;

use async_trait::async_trait;
use serde::Serialize;

pub use error::{ArchiveError, SyncError};
pub use local::LocalArchive;
pub use notion::NotionArchive;
pub use payload::{ArchivePayload, ArchivedEvent};
pub use sync::{ArchiveSync, RetryPolicy};

/// Reference to a record in the archive, returned by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveRef {
    pub id: String,
    pub url: Option<String>,
}

/// Create-or-update of one archive record. `existing` is the reference
/// a previous call returned for the same message, if any.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    fn name(&self) -> &str;

    async fn upsert(
        &self,
        existing: Option<&str>,
        payload: &ArchivePayload,
    ) -> Result<ArchiveRef, ArchiveError>;
}
