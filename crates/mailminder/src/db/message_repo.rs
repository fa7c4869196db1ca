//! Message repository: CRUD operations for the `messages` table.
//!
//! Status changes go through [`transition`], [`mark_failed`] and
//! [`complete_analysis`], each a single conditional `UPDATE` guarded by the
//! expected current status. A message therefore moves
//! `unprocessed -> analyzing -> analyzed | failed`, and only a re-analysis
//! may move `failed -> analyzing`. `analyzed` is final.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::delivery_repo::{self, DeliveryRow};
use super::event_repo::{self, EventRow};
use super::{Database, DatabaseError};

/// Processing status of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Unprocessed,
    Analyzing,
    Analyzed,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unprocessed => "unprocessed",
            MessageStatus::Analyzing => "analyzing",
            MessageStatus::Analyzed => "analyzed",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unprocessed" => Some(MessageStatus::Unprocessed),
            "analyzing" => Some(MessageStatus::Analyzing),
            "analyzed" => Some(MessageStatus::Analyzed),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for MessageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MessageStatus::parse(text).ok_or_else(|| FromSqlError::Other(text.to_string().into()))
    }
}

/// A raw message row from the database.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub received_at: String,
    /// JSON array of keyword matches recorded at save time.
    pub keywords: String,
    pub status: MessageStatus,
    pub summary: Option<String>,
    pub importance_score: Option<u8>,
    pub importance_reason: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            sender: row.get("sender")?,
            subject: row.get("subject")?,
            body: row.get("body")?,
            received_at: row.get("received_at")?,
            keywords: row.get("keywords")?,
            status: row.get("status")?,
            summary: row.get("summary")?,
            importance_score: row.get("importance_score")?,
            importance_reason: row.get("importance_reason")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Analysis fields written onto a message when extraction succeeds.
#[derive(Debug, Clone)]
pub struct AnalysisUpdate {
    pub summary: String,
    pub importance_score: u8,
    pub importance_reason: String,
    pub updated_at: String,
}

/// A message joined with its event count and archive outcome.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReportRow {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: String,
    pub status: MessageStatus,
    pub importance_score: Option<u8>,
    pub error: Option<String>,
    pub event_count: u32,
    pub archive_outcome: Option<String>,
    pub archive_error: Option<String>,
}

/// Query filter for the reporting view.
#[derive(Debug, Default, Clone)]
pub struct MessageFilter {
    pub status: Option<MessageStatus>,
    pub limit: Option<u32>,
}

/// Inserts a message unless one with the same id exists.
/// Returns true if a row was inserted.
pub fn insert_if_absent(db: &Database, row: &MessageRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO messages (id, sender, subject, body, received_at, keywords,
             status, summary, importance_score, importance_reason, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.sender,
                row.subject,
                row.body,
                row.received_at,
                row.keywords,
                row.status,
                row.summary,
                row.importance_score,
                row.importance_reason,
                row.error,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a message by its mailbox id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<MessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM messages WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], MessageRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns the ids of messages in any of the given statuses, oldest first.
pub fn list_ids_by_status(
    db: &Database,
    statuses: &[MessageStatus],
) -> Result<Vec<String>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT id FROM messages WHERE status IN ({}) ORDER BY received_at ASC, id ASC",
            placeholders.join(", ")
        );
        let params_ref: Vec<&dyn ToSql> = statuses.iter().map(|s| s as &dyn ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_ref.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    })
}

/// Atomically moves a message to `to` if its current status is one of `from`.
/// Returns false when the message was not in an expected status.
pub fn transition(
    db: &Database,
    id: &str,
    from: &[MessageStatus],
    to: MessageStatus,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| transition_on(conn, id, from, to, now))
}

fn transition_on(
    conn: &Connection,
    id: &str,
    from: &[MessageStatus],
    to: MessageStatus,
    now: &str,
) -> Result<bool, DatabaseError> {
    if from.is_empty() {
        return Ok(false);
    }
    let placeholders: Vec<String> = (4..4 + from.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "UPDATE messages SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
        placeholders.join(", ")
    );

    let mut param_values: Vec<&dyn ToSql> = vec![&to, &now, &id];
    for status in from {
        param_values.push(status);
    }
    let changed = conn.execute(&sql, param_values.as_slice())?;
    Ok(changed == 1)
}

/// Marks an `analyzing` message as failed and records the error.
pub fn mark_failed(db: &Database, id: &str, error: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE messages SET status = 'failed', error = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'analyzing'",
            params![id, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Fails every message left in `analyzing` by a run that no longer exists.
/// Returns the number of messages moved.
pub fn fail_stranded(db: &Database, error: &str, now: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE messages SET status = 'failed', error = ?1, updated_at = ?2
             WHERE status = 'analyzing'",
            params![error, now],
        )?;
        Ok(changed)
    })
}

/// Records a successful analysis: writes the summary fields, replaces the
/// message's events, schedules their deliveries and moves the message
/// `analyzing -> analyzed`, in one transaction.
///
/// Returns false (and writes nothing) if the message was not `analyzing`.
pub fn complete_analysis(
    db: &Database,
    id: &str,
    analysis: &AnalysisUpdate,
    events: &[EventRow],
    deliveries: &[DeliveryRow],
) -> Result<bool, DatabaseError> {
    db.with_tx(|conn| {
        let changed = conn.execute(
            "UPDATE messages SET status = 'analyzed', summary = ?2, importance_score = ?3,
             importance_reason = ?4, error = NULL, updated_at = ?5
             WHERE id = ?1 AND status = 'analyzing'",
            params![
                id,
                analysis.summary,
                analysis.importance_score,
                analysis.importance_reason,
                analysis.updated_at,
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        event_repo::delete_for_message_on(conn, id)?;
        for event in events {
            event_repo::insert_on(conn, event)?;
        }
        for delivery in deliveries {
            delivery_repo::insert_if_absent_on(conn, delivery)?;
        }
        Ok(true)
    })
}

/// Lists messages for the reporting view, newest first.
pub fn report(
    db: &Database,
    filter: &MessageFilter,
) -> Result<Vec<MessageReportRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut sql = String::from(
            "SELECT m.id, m.sender, m.subject, m.received_at, m.status, m.importance_score,
                    m.error,
                    (SELECT COUNT(*) FROM events e WHERE e.message_id = m.id) AS event_count,
                    a.last_outcome, a.last_error
             FROM messages m
             LEFT JOIN archive_records a ON a.message_id = m.id",
        );
        let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" WHERE m.status = ?1");
            param_values.push(Box::new(status));
        }
        sql.push_str(" ORDER BY m.received_at DESC, m.id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(MessageReportRow {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    subject: row.get(2)?,
                    received_at: row.get(3)?,
                    status: row.get(4)?,
                    importance_score: row.get(5)?,
                    error: row.get(6)?,
                    event_count: row.get(7)?,
                    archive_outcome: row.get(8)?,
                    archive_error: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
