//! Turns raw RFC 5322 bytes into a [`RawMessage`].

use chrono::{DateTime, Utc};
use mail_parser::{Addr, MessageParser};

use super::error::{MailError, Result};
use super::RawMessage;

/// Parses a fetched message.
///
/// The Message-ID header is the mailbox identifier; `fallback_id` is used
/// when it is missing. `fetched_at` stands in for a missing Date header.
/// HTML-only bodies are rendered to plain text.
pub fn parse_message(raw: &[u8], fallback_id: &str, fetched_at: DateTime<Utc>) -> Result<RawMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::ParseError(format!("unparseable message {}", fallback_id)))?;

    let id = message
        .message_id()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback_id.to_string());

    let sender = message
        .from()
        .and_then(|addr| addr.first())
        .map(format_address)
        .unwrap_or_default();

    let subject = message
        .subject()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let body = message
        .body_text(0)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    let received_at = message
        .date()
        .and_then(|date| DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0))
        .unwrap_or(fetched_at);

    Ok(RawMessage {
        id,
        sender,
        subject,
        body,
        received_at,
    })
}

fn format_address(addr: &Addr<'_>) -> String {
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{} <{}>", name, address),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}
