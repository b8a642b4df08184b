//! Per-recipient sealed content keys.
//!
//! A wrap belongs to a subject (a message, or a conversation's name) and a
//! recipient. Writers always replace the full set of wraps of a subject
//! inside the same transaction as the content they protect.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use luvvix_shared::{KeyWrap, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::sql::parse_id;

impl Database {
    /// The wrap addressed to `recipient` for `subject`, if any.
    pub fn get_key_wrap(&self, subject: Uuid, recipient: UserId) -> Result<Option<KeyWrap>> {
        let wrap = self
            .conn()
            .query_row(
                "SELECT recipient_id, key_version, wrapped_key
                 FROM key_wraps WHERE subject_id = ?1 AND recipient_id = ?2",
                params![subject.to_string(), recipient.to_string()],
                row_to_wrap,
            )
            .optional()?;
        Ok(wrap)
    }

    /// Wraps addressed to `recipient` for several subjects at once.
    pub fn get_key_wraps_for(
        &self,
        subjects: &[Uuid],
        recipient: UserId,
    ) -> Result<HashMap<Uuid, KeyWrap>> {
        let mut map = HashMap::new();
        for subject in subjects {
            if let Some(wrap) = self.get_key_wrap(*subject, recipient)? {
                map.insert(*subject, wrap);
            }
        }
        Ok(map)
    }

    pub fn list_key_wraps(&self, subject: Uuid) -> Result<Vec<KeyWrap>> {
        let mut stmt = self.conn().prepare(
            "SELECT recipient_id, key_version, wrapped_key
             FROM key_wraps WHERE subject_id = ?1 ORDER BY recipient_id",
        )?;
        let rows = stmt.query_map(params![subject.to_string()], row_to_wrap)?;

        let mut wraps = Vec::new();
        for row in rows {
            wraps.push(row?);
        }
        Ok(wraps)
    }
}

/// Replace every wrap of `subject` with `wraps`. Meant to run inside a
/// caller-owned transaction.
pub(crate) fn replace_key_wraps(conn: &Connection, subject: Uuid, wraps: &[KeyWrap]) -> Result<()> {
    conn.execute(
        "DELETE FROM key_wraps WHERE subject_id = ?1",
        params![subject.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO key_wraps (subject_id, recipient_id, key_version, wrapped_key)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for wrap in wraps {
        stmt.execute(params![
            subject.to_string(),
            wrap.recipient_id.to_string(),
            wrap.key_version,
            wrap.wrapped_key,
        ])?;
    }
    Ok(())
}

fn row_to_wrap(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyWrap> {
    let recipient: String = row.get(0)?;
    Ok(KeyWrap {
        recipient_id: parse_id(0, &recipient)?,
        key_version: row.get(1)?,
        wrapped_key: row.get(2)?,
    })
}
