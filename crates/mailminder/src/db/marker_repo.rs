//! Mail marker repository: the per-source high-water mark.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// Returns the stored marker for a mail source.
pub fn get(db: &Database, source_name: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let marker = conn
            .query_row(
                "SELECT marker FROM mail_markers WHERE source_name = ?1",
                params![source_name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(marker)
    })
}

/// Stores the marker for a mail source, replacing any previous one.
pub fn set(db: &Database, source_name: &str, marker: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mail_markers (source_name, marker, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(source_name) DO UPDATE SET
                marker = excluded.marker,
                updated_at = excluded.updated_at",
            params![source_name, marker, now],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_replace() {
        let db = Database::open_in_memory().unwrap();
        assert!(get(&db, "INBOX").unwrap().is_none());

        set(&db, "INBOX", "7:10", "2024-05-01T00:00:00Z").unwrap();
        set(&db, "INBOX", "7:12", "2024-05-02T00:00:00Z").unwrap();
        set(&db, "Archive", "3:1", "2024-05-02T00:00:00Z").unwrap();

        assert_eq!(get(&db, "INBOX").unwrap().as_deref(), Some("7:12"));
        assert_eq!(get(&db, "Archive").unwrap().as_deref(), Some("3:1"));
    }
}
