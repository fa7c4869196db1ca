//! Event repository: rows for the `events` table.
//!
//! Events are only written together with their message's analysis (see
//! `message_repo::complete_analysis`), so the write helpers take a
//! connection that is already inside a transaction.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw event row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: String,
    pub message_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub importance_score: u8,
    pub tier: String,
    pub created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            message_id: row.get("message_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            location: row.get("location")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            importance_score: row.get("importance_score")?,
            tier: row.get("tier")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Creates the id of the `index`-th event extracted from a message.
pub fn make_id(message_id: &str, index: usize) -> String {
    format!("{}#{}", message_id, index)
}

pub(crate) fn insert_on(conn: &Connection, event: &EventRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO events (id, message_id, title, description, location, start_time,
         end_time, importance_score, tier, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.id,
            event.message_id,
            event.title,
            event.description,
            event.location,
            event.start_time,
            event.end_time,
            event.importance_score,
            event.tier,
            event.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_for_message_on(
    conn: &Connection,
    message_id: &str,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM events WHERE message_id = ?1",
        params![message_id],
    )?;
    Ok(deleted)
}

/// Returns the events of a message in extraction order.
pub fn list_for_message(db: &Database, message_id: &str) -> Result<Vec<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE message_id = ?1 ORDER BY start_time ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![message_id], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds an event by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<EventRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM events WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], EventRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
