//! Mail source collaborator.
//!
//! The pipeline only sees the [`MailSource`] trait: "give me everything
//! newer than this marker". The IMAP implementation encodes its marker as
//! `<uidvalidity>:<uid>`; callers treat it as opaque and persist it as is.

pub mod client;
pub mod error;
pub mod imap_source;
pub mod parser;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use client::{ImapClient, ImapSettings};
pub use error::MailError;
pub use imap_source::ImapMailSource;
pub use parser::parse_message;

/// One fetched mail item, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Result of one incremental fetch.
#[derive(Debug, Clone, Default)]
pub struct MailBatch {
    pub messages: Vec<RawMessage>,
    /// Marker to persist once the batch is saved. `None` keeps the old one.
    pub marker: Option<String>,
}

#[async_trait]
pub trait MailSource: Send + Sync {
    /// Stable name used as the key for the persisted marker.
    fn name(&self) -> &str;

    /// Lists messages newer than `since`. `None` means "from the beginning".
    async fn list_new(&self, since: Option<&str>) -> Result<MailBatch, MailError>;
}
