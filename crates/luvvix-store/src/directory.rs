//! CRUD operations for [`DirectoryEntry`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use luvvix_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::DirectoryEntry;
use crate::sql::{not_found, parse_id, parse_ts, ts};

impl Database {
    /// Insert or replace the entry for `user_id`.
    ///
    /// Republishing the stored key keeps its version; a different key bumps
    /// it by one.
    pub fn upsert_directory_entry(
        &self,
        user_id: UserId,
        public_key: &str,
        now: DateTime<Utc>,
    ) -> Result<DirectoryEntry> {
        let tx = self.conn().unchecked_transaction()?;

        let existing: Option<(String, u32)> = tx
            .query_row(
                "SELECT public_key, key_version FROM directory_entries WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let key_version = match existing {
            Some((stored, version)) if stored == public_key => version,
            Some((_, version)) => version + 1,
            None => 1,
        };

        tx.execute(
            "INSERT INTO directory_entries (user_id, public_key, key_version, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                public_key = excluded.public_key,
                key_version = excluded.key_version,
                updated_at = excluded.updated_at",
            params![user_id.to_string(), public_key, key_version, ts(&now)],
        )?;
        tx.commit()?;

        Ok(DirectoryEntry {
            user_id,
            public_key: public_key.to_string(),
            key_version,
            updated_at: now,
        })
    }

    pub fn get_directory_entry(&self, user_id: UserId) -> Result<DirectoryEntry> {
        self.conn()
            .query_row(
                "SELECT user_id, public_key, key_version, updated_at
                 FROM directory_entries WHERE user_id = ?1",
                params![user_id.to_string()],
                row_to_entry,
            )
            .map_err(not_found)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirectoryEntry> {
    let user_id: String = row.get(0)?;
    let updated_at: String = row.get(3)?;

    Ok(DirectoryEntry {
        user_id: parse_id(0, &user_id)?,
        public_key: row.get(1)?,
        key_version: row.get(2)?,
        updated_at: parse_ts(3, &updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    fn count(db: &Database, user_id: UserId) -> i64 {
        db.conn()
            .query_row(
                "SELECT COUNT(*) FROM directory_entries WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn upsert_overwrites_single_entry() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new();

        db.upsert_directory_entry(user, "key-one", Utc::now()).unwrap();
        db.upsert_directory_entry(user, "key-two", Utc::now()).unwrap();

        assert_eq!(count(&db, user), 1);
        let entry = db.get_directory_entry(user).unwrap();
        assert_eq!(entry.public_key, "key-two");
        assert_eq!(entry.key_version, 2);
    }

    #[test]
    fn republishing_same_key_keeps_version() {
        let db = Database::open_in_memory().unwrap();
        let user = UserId::new();

        db.upsert_directory_entry(user, "stable", Utc::now()).unwrap();
        let again = db.upsert_directory_entry(user, "stable", Utc::now()).unwrap();
        assert_eq!(again.key_version, 1);
    }

    #[test]
    fn missing_entry_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_directory_entry(UserId::new()),
            Err(StoreError::NotFound)
        ));
    }
}
