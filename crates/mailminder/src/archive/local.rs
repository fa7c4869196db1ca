use async_trait::async_trait;

use super::error::ArchiveError;
use super::payload::ArchivePayload;
use super::{ArchiveRef, ArchiveSink};

/// Sink used when no external archive is configured. The payload itself is
/// kept in `archive_records` by the sync stage.
#[derive(Debug, Default, Clone)]
pub struct LocalArchive;

#[async_trait]
impl ArchiveSink for LocalArchive {
    fn name(&self) -> &str {
        "local"
    }

    async fn upsert(
        &self,
        existing: Option<&str>,
        payload: &ArchivePayload,
    ) -> Result<ArchiveRef, ArchiveError> {
        let id = existing
            .map(str::to_string)
            .unwrap_or_else(|| format!("local:{}", payload.message_id));
        Ok(ArchiveRef { id, url: None })
    }
}
