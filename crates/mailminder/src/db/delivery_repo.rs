//! Reminder delivery repository: rows for the `reminder_deliveries` table.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// Acknowledgment state of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Acked,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Pending => "pending",
            DeliveryState::Sent => "sent",
            DeliveryState::Acked => "acked",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for DeliveryState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DeliveryState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(DeliveryState::Pending),
            "sent" => Ok(DeliveryState::Sent),
            "acked" => Ok(DeliveryState::Acked),
            other => Err(FromSqlError::Other(other.to_string().into())),
        }
    }
}

/// A raw delivery row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRow {
    pub id: String,
    pub event_id: String,
    pub offset_label: String,
    pub reminder_time: String,
    pub channel: String,
    pub color: String,
    pub state: DeliveryState,
    pub created_at: String,
    pub sent_at: Option<String>,
    pub acked_at: Option<String>,
}

impl DeliveryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            offset_label: row.get("offset_label")?,
            reminder_time: row.get("reminder_time")?,
            channel: row.get("channel")?,
            color: row.get("color")?,
            state: row.get("state")?,
            created_at: row.get("created_at")?,
            sent_at: row.get("sent_at")?,
            acked_at: row.get("acked_at")?,
        })
    }
}

/// A due delivery joined with the event fields a client displays.
#[derive(Debug, Clone, PartialEq)]
pub struct DueDeliveryRow {
    pub id: String,
    pub event_id: String,
    pub title: String,
    pub start_time: String,
    pub reminder_time: String,
    pub location: Option<String>,
    pub color: String,
    pub state: DeliveryState,
}

/// Inserts a delivery unless one with the same id exists.
///
/// Deliveries are immutable apart from their state, so an existing row is
/// left untouched. Returns true if a row was inserted.
pub fn insert_if_absent(db: &Database, row: &DeliveryRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| insert_if_absent_on(conn, row))
}

pub(crate) fn insert_if_absent_on(conn: &Connection, row: &DeliveryRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO reminder_deliveries (id, event_id, offset_label, reminder_time,
         channel, color, state, created_at, sent_at, acked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.id,
            row.event_id,
            row.offset_label,
            row.reminder_time,
            row.channel,
            row.color,
            row.state,
            row.created_at,
            row.sent_at,
            row.acked_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Finds a delivery by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<DeliveryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM reminder_deliveries WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DeliveryRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns all deliveries of an event, earliest first.
pub fn list_for_event(db: &Database, event_id: &str) -> Result<Vec<DeliveryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM reminder_deliveries WHERE event_id = ?1 ORDER BY reminder_time ASC",
        )?;
        let rows = stmt
            .query_map(params![event_id], DeliveryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns deliveries due at `now` that are not acked, and marks the
/// pending ones as sent, in one transaction.
///
/// The returned rows carry the state they had before this call.
pub fn take_due(db: &Database, now: &str) -> Result<Vec<DueDeliveryRow>, DatabaseError> {
    db.with_tx(|conn| {
        let due = {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.event_id, e.title, e.start_time, d.reminder_time, e.location,
                        d.color, d.state
                 FROM reminder_deliveries d
                 JOIN events e ON e.id = d.event_id
                 WHERE d.state IN ('pending', 'sent') AND d.reminder_time <= ?1
                 ORDER BY d.reminder_time ASC, d.id ASC",
            )?;
            let rows = stmt
                .query_map(params![now], |row| {
                    Ok(DueDeliveryRow {
                        id: row.get(0)?,
                        event_id: row.get(1)?,
                        title: row.get(2)?,
                        start_time: row.get(3)?,
                        reminder_time: row.get(4)?,
                        location: row.get(5)?,
                        color: row.get(6)?,
                        state: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        conn.execute(
            "UPDATE reminder_deliveries SET state = 'sent', sent_at = ?1
             WHERE state = 'pending' AND reminder_time <= ?1",
            params![now],
        )?;

        Ok(due)
    })
}

/// Marks a delivery as acked. Acking an acked delivery is a no-op.
/// Returns false if no delivery has this id.
pub fn ack(db: &Database, id: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE reminder_deliveries SET state = 'acked', acked_at = COALESCE(acked_at, ?2)
             WHERE id = ?1",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO messages (id, sender, subject, body, received_at, created_at, updated_at)
                     VALUES ('m1', 's', 'subj', 'b', 'now', 'now', 'now');
                 INSERT INTO events (id, message_id, title, location, start_time, importance_score, tier, created_at)
                     VALUES ('m1#0', 'm1', 'Exam', 'Room 101', '2024-06-04T09:00:00Z', 9, 'important', 'now');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn delivery(label: &str, reminder_time: &str) -> DeliveryRow {
        DeliveryRow {
            id: format!("m1#0:{}", label),
            event_id: "m1#0".to_string(),
            offset_label: label.to_string(),
            reminder_time: reminder_time.to_string(),
            channel: "browser".to_string(),
            color: "#FF4444".to_string(),
            state: DeliveryState::Pending,
            created_at: "2024-05-01T00:00:00Z".to_string(),
            sent_at: None,
            acked_at: None,
        }
    }

    #[test]
    fn test_insert_if_absent_keeps_first_row() {
        let db = seeded_db();
        assert!(insert_if_absent(&db, &delivery("1d", "2024-06-03T09:00:00Z")).unwrap());

        let mut changed = delivery("1d", "2024-06-03T10:00:00Z");
        changed.color = "#000000".to_string();
        assert!(!insert_if_absent(&db, &changed).unwrap());

        let stored = find_by_id(&db, "m1#0:1d").unwrap().unwrap();
        assert_eq!(stored.reminder_time, "2024-06-03T09:00:00Z");
        assert_eq!(stored.color, "#FF4444");
        assert_eq!(list_for_event(&db, "m1#0").unwrap().len(), 1);
    }

    #[test]
    fn test_take_due_marks_sent_and_keeps_returning_until_acked() {
        let db = seeded_db();
        insert_if_absent(&db, &delivery("3d", "2024-06-01T09:00:00Z")).unwrap();
        insert_if_absent(&db, &delivery("1h", "2024-06-04T08:00:00Z")).unwrap();

        let now = "2024-06-02T00:00:00Z";
        let first = take_due(&db, now).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "m1#0:3d");
        assert_eq!(first[0].title, "Exam");
        assert_eq!(first[0].location.as_deref(), Some("Room 101"));
        assert_eq!(first[0].state, DeliveryState::Pending);

        let stored = find_by_id(&db, "m1#0:3d").unwrap().unwrap();
        assert_eq!(stored.state, DeliveryState::Sent);
        assert_eq!(stored.sent_at.as_deref(), Some(now));

        let second = take_due(&db, now).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].state, DeliveryState::Sent);

        assert!(ack(&db, "m1#0:3d", now).unwrap());
        assert!(take_due(&db, now).unwrap().is_empty());
    }

    #[test]
    fn test_ack_is_idempotent() {
        let db = seeded_db();
        insert_if_absent(&db, &delivery("1d", "2024-06-03T09:00:00Z")).unwrap();

        assert!(ack(&db, "m1#0:1d", "2024-06-03T09:05:00Z").unwrap());
        assert!(ack(&db, "m1#0:1d", "2024-06-03T09:10:00Z").unwrap());

        let stored = find_by_id(&db, "m1#0:1d").unwrap().unwrap();
        assert_eq!(stored.state, DeliveryState::Acked);
        assert_eq!(stored.acked_at.as_deref(), Some("2024-06-03T09:05:00Z"));
    }

    #[test]
    fn test_ack_unknown_delivery() {
        let db = seeded_db();
        assert!(!ack(&db, "missing", "2024-06-03T09:05:00Z").unwrap());
    }
}
