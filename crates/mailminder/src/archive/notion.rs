//! Notion-compatible archive sink.
//!
//! Creates one page per message in a database and updates its properties on
//! later syncs. Only the page properties are rewritten on update; the body
//! blocks written at creation stay as they were.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ArchiveConfig;
use crate::db::message_repo::MessageStatus;
use crate::error::ConfigError;

use super::error::ArchiveError;
use super::payload::{ArchivePayload, ArchivedEvent};
use super::{ArchiveRef, ArchiveSink};

/// Longest text Notion accepts in one rich-text object.
const RICH_TEXT_LIMIT: usize = 2000;

#[derive(Deserialize)]
struct PageResponse {
    id: Option<String>,
    url: Option<String>,
}

pub struct NotionArchive {
    base_url: String,
    database_id: String,
    notion_version: String,
    token: SecretString,
    client: Client,
}

impl NotionArchive {
    pub fn new(config: &ArchiveConfig, token: SecretString) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            database_id: config.database_id.clone(),
            notion_version: config.notion_version.clone(),
            token,
            client,
        })
    }

    pub fn from_config(config: &ArchiveConfig) -> Result<Self, ConfigError> {
        let token = config
            .token_source()
            .resolve()
            .map_err(|source| ConfigError::Secret {
                name: "archive.token",
                source,
            })?;
        Self::new(config, token).map_err(|e| ConfigError::validation(e.to_string()))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("Notion-Version", &self.notion_version)
    }

    async fn send(&self, builder: RequestBuilder, body: &Value) -> Result<ArchiveRef, ArchiveError> {
        let res = self.authorized(builder).json(body).send().await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ArchiveError::Status {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let page: PageResponse = res.json().await?;
        let id = page
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ArchiveError::InvalidResponse("page id missing".to_string()))?;
        Ok(ArchiveRef { id, url: page.url })
    }
}

#[async_trait]
impl ArchiveSink for NotionArchive {
    fn name(&self) -> &str {
        "notion"
    }

    async fn upsert(
        &self,
        existing: Option<&str>,
        payload: &ArchivePayload,
    ) -> Result<ArchiveRef, ArchiveError> {
        match existing {
            Some(page_id) => {
                debug!(page_id, message_id = %payload.message_id, "updating archive page");
                let url = format!("{}/pages/{}", self.base_url, page_id);
                let body = json!({ "properties": page_properties(payload) });
                self.send(self.client.patch(url), &body).await
            }
            None => {
                debug!(message_id = %payload.message_id, "creating archive page");
                let url = format!("{}/pages", self.base_url);
                let body = json!({
                    "parent": { "database_id": self.database_id },
                    "properties": page_properties(payload),
                    "children": page_children(payload),
                });
                self.send(self.client.post(url), &body).await
            }
        }
    }
}

fn rich_text(content: &str) -> Value {
    let truncated: String = content.chars().take(RICH_TEXT_LIMIT).collect();
    json!([{ "type": "text", "text": { "content": truncated } }])
}

fn block(kind: &str, content: &str) -> Value {
    let mut value = json!({ "object": "block", "type": kind });
    value[kind] = json!({ "rich_text": rich_text(content) });
    value
}

pub(crate) fn page_properties(payload: &ArchivePayload) -> Value {
    let subject = if payload.subject.is_empty() {
        "(no subject)"
    } else {
        payload.subject.as_str()
    };
    let status = match payload.status {
        MessageStatus::Failed => "Analysis Failed",
        _ => "Archived",
    };

    let mut properties = json!({
        "Subject": { "title": rich_text(subject) },
        "Sender": { "rich_text": rich_text(&payload.sender) },
        "Received": { "date": { "start": payload.received_at } },
        "Summary": { "rich_text": rich_text(payload.summary.as_deref().unwrap_or("")) },
        "Event Count": { "number": payload.events.len() },
        "Status": { "select": { "name": status } },
    });
    if let Some(tier) = payload.tier() {
        properties["Importance"] = json!({ "select": { "name": tier.label() } });
    }
    properties
}

fn describe_event(event: &ArchivedEvent) -> String {
    let mut line = format!("{} ({})", event.title, event.start_time);
    if let Some(end) = &event.end_time {
        line.push_str(&format!(" until {}", end));
    }
    if let Some(location) = &event.location {
        line.push_str(&format!(" @ {}", location));
    }
    line
}

pub(crate) fn page_children(payload: &ArchivePayload) -> Value {
    let mut children = vec![
        block("heading_2", "Summary"),
        block("paragraph", payload.summary.as_deref().unwrap_or("")),
    ];

    if let Some(reason) = payload.importance_reason.as_deref().filter(|r| !r.is_empty()) {
        children.push(block("heading_2", "Importance"));
        children.push(block("paragraph", reason));
    }

    children.push(block("heading_2", "Events"));
    if payload.events.is_empty() {
        children.push(block("paragraph", "No time-bound events."));
    } else {
        for event in &payload.events {
            children.push(block("bulleted_list_item", &describe_event(event)));
        }
    }

    if let Some(error) = &payload.error {
        children.push(block("heading_2", "Error"));
        children.push(block("paragraph", error));
    }

    Value::Array(children)
}
