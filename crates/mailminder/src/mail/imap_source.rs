//! [`MailSource`] over IMAP, incremental by UID.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::client::{ImapClient, ImapSettings};
use super::error::{MailError, Result};
use super::parser::parse_message;
use super::{MailBatch, MailSource};

/// Position in a folder: the folder's UIDVALIDITY and the last UID seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidMarker {
    pub uidvalidity: u32,
    pub last_uid: u32,
}

impl UidMarker {
    pub fn parse(value: &str) -> Option<Self> {
        let (validity, uid) = value.split_once(':')?;
        Some(Self {
            uidvalidity: validity.trim().parse().ok()?,
            last_uid: uid.trim().parse().ok()?,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.uidvalidity, self.last_uid)
    }

    /// The UID to resume after in a folder whose current UIDVALIDITY is
    /// `uidvalidity`. A changed UIDVALIDITY invalidates all old UIDs.
    pub fn resume_after(marker: Option<Self>, uidvalidity: u32) -> u32 {
        match marker {
            Some(m) if m.uidvalidity == uidvalidity => m.last_uid,
            _ => 0,
        }
    }
}

pub struct ImapMailSource {
    settings: ImapSettings,
    name: String,
}

impl ImapMailSource {
    pub fn new(settings: ImapSettings) -> Self {
        let name = format!("imap:{}@{}/{}", settings.username, settings.host, settings.folder);
        Self { settings, name }
    }

    async fn fetch_batch(&self, since: Option<&str>) -> Result<MailBatch> {
        let marker = since.and_then(|value| {
            let parsed = UidMarker::parse(value);
            if parsed.is_none() {
                warn!("Ignoring unreadable mail marker '{}'", value);
            }
            parsed
        });

        let mut client = ImapClient::new(self.settings.clone());
        client.connect().await?;

        let result = self.fetch_with(&mut client, marker).await;
        if let Err(e) = client.disconnect().await {
            warn!("IMAP logout failed: {}", e);
        }
        result
    }

    async fn fetch_with(&self, client: &mut ImapClient, marker: Option<UidMarker>) -> Result<MailBatch> {
        let folder = self.settings.folder.as_str();
        let uidvalidity = client.examine_folder(folder).await?;

        if let Some(m) = marker {
            if m.uidvalidity != uidvalidity {
                warn!(
                    "UIDVALIDITY of '{}' changed from {} to {}; rescanning folder",
                    folder, m.uidvalidity, uidvalidity
                );
            }
        }
        let last_uid = UidMarker::resume_after(marker, uidvalidity);

        let uids: Vec<u32> = client
            .search_since_uid(last_uid)
            .await?
            .into_iter()
            .take(self.settings.batch_size)
            .collect();

        if uids.is_empty() {
            debug!("No new messages in '{}'", folder);
            return Ok(MailBatch {
                messages: Vec::new(),
                marker: Some(UidMarker { uidvalidity, last_uid }.encode()),
            });
        }

        let fetched = client.fetch_peek(&uids).await?;
        let fetched_at = Utc::now();
        let mut delivered = Vec::with_capacity(fetched.len());
        let mut messages = Vec::with_capacity(fetched.len());

        for (uid, raw) in fetched {
            let fallback_id = format!("{}:{}:{}", folder, uidvalidity, uid);
            match parse_message(&raw, &fallback_id, fetched_at) {
                Ok(message) => {
                    delivered.push(uid);
                    messages.push(message);
                }
                Err(e) => warn!("Skipping UID {} in '{}': {}", uid, folder, e),
            }
        }

        let next_uid = next_last_uid(last_uid, &uids, &delivered);
        if delivered.len() < uids.len() {
            warn!(
                "{} of {} messages in '{}' not delivered; holding marker at UID {}",
                uids.len() - delivered.len(),
                uids.len(),
                folder,
                next_uid
            );
        }
        info!(
            "Fetched {} new messages from '{}' (UIDs up to {})",
            messages.len(),
            folder,
            next_uid
        );

        Ok(MailBatch {
            messages,
            marker: Some(
                UidMarker {
                    uidvalidity,
                    last_uid: next_uid,
                }
                .encode(),
            ),
        })
    }
}

/// The last UID safe to record after requesting `requested` and delivering
/// `delivered`. It stays below the lowest requested UID that was not
/// delivered, so that message is fetched again on the next check, and
/// never moves back past `last_uid`.
pub fn next_last_uid(last_uid: u32, requested: &[u32], delivered: &[u32]) -> u32 {
    let highest = delivered.iter().copied().fold(last_uid, u32::max);
    let lowest_missing = requested
        .iter()
        .copied()
        .filter(|uid| *uid > last_uid && !delivered.contains(uid))
        .min();

    match lowest_missing {
        Some(uid) => highest.min(uid - 1).max(last_uid),
        None => highest,
    }
}

#[async_trait]
impl MailSource for ImapMailSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_new(&self, since: Option<&str>) -> Result<MailBatch> {
        let timeout = self.settings.timeout;
        tokio::time::timeout(timeout, self.fetch_batch(since))
            .await
            .map_err(|_| MailError::Timeout(timeout.as_secs()))?
    }
}
