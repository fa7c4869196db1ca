//! Scripted fake collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use mailminder::archive::{ArchiveError, ArchivePayload, ArchiveRef, ArchiveSink};
use mailminder::extraction::{LanguageModel, ModelError};
use mailminder::mail::{MailBatch, MailError, MailSource, RawMessage};

/// Mail source over an in-memory mailbox. The marker is the number of
/// messages already handed out.
pub struct FakeMailSource {
    mailbox: Mutex<Vec<RawMessage>>,
    fail_with: Mutex<Option<String>>,
    ignore_marker: bool,
    calls: Mutex<u32>,
}

impl FakeMailSource {
    pub fn new() -> Self {
        Self {
            mailbox: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            ignore_marker: false,
            calls: Mutex::new(0),
        }
    }

    /// A source that always returns the whole mailbox, as a server that
    /// lost its state would.
    pub fn replaying() -> Self {
        Self {
            ignore_marker: true,
            ..Self::new()
        }
    }

    pub fn deliver(&self, message: RawMessage) {
        self.mailbox.lock().unwrap().push(message);
    }

    pub fn fail(&self, error: &str) {
        *self.fail_with.lock().unwrap() = Some(error.to_string());
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MailSource for FakeMailSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_new(&self, since: Option<&str>) -> Result<MailBatch, MailError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(MailError::ConnectionFailed(error));
        }

        let mailbox = self.mailbox.lock().unwrap();
        let skip = if self.ignore_marker {
            0
        } else {
            since.and_then(|m| m.parse::<usize>().ok()).unwrap_or(0)
        };
        Ok(MailBatch {
            messages: mailbox.iter().skip(skip).cloned().collect(),
            marker: Some(mailbox.len().to_string()),
        })
    }
}

#[derive(Clone)]
pub enum Reply {
    Text(String),
    Status(u16),
    Hang,
    Panic,
}

/// Model whose reply is picked by a substring of the prompt.
pub struct ScriptedModel {
    replies: Mutex<Vec<(String, Reply)>>,
    default: Reply,
}

impl ScriptedModel {
    pub fn new(default: Reply) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            default,
        }
    }

    /// Replies with `reply` when the prompt contains `needle`.
    pub fn on(&self, needle: &str, reply: Reply) {
        let mut replies = self.replies.lock().unwrap();
        replies.retain(|(n, _)| n != needle);
        replies.push((needle.to_string(), reply));
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default.clone());

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Status(status) => Err(ModelError::Status {
                status,
                body: "scripted".to_string(),
            }),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(ModelError::EmptyReply)
            }
            Reply::Panic => panic!("scripted model panic"),
        }
    }
}

/// Archive sink that records every call and can reject chosen messages.
pub struct RecordingArchive {
    pub calls: Mutex<Vec<(Option<String>, ArchivePayload)>>,
    failures: Mutex<HashMap<String, u16>>,
}

impl RecordingArchive {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_for(&self, message_id: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(message_id.to_string(), status);
    }

    pub fn payloads_for(&self, message_id: &str) -> Vec<ArchivePayload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.message_id == message_id)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ArchiveSink for RecordingArchive {
    fn name(&self) -> &str {
        "recording"
    }

    async fn upsert(
        &self,
        existing: Option<&str>,
        payload: &ArchivePayload,
    ) -> Result<ArchiveRef, ArchiveError> {
        self.calls
            .lock()
            .unwrap()
            .push((existing.map(str::to_string), payload.clone()));

        if let Some(status) = self.failures.lock().unwrap().get(&payload.message_id) {
            return Err(ArchiveError::Status {
                status: *status,
                body: "scripted".to_string(),
            });
        }
        Ok(ArchiveRef {
            id: existing
                .map(str::to_string)
                .unwrap_or_else(|| format!("page-{}", payload.message_id)),
            url: None,
        })
    }
}
