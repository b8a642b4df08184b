//! CRUD operations for [`Participant`] records.

use rusqlite::{params, Connection};

use luvvix_shared::{ConversationId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{KeySnapshot, Participant, ParticipantRole};
use crate::sql::{invalid_column, not_found, parse_id, parse_ts, ts};

const SELECT_PARTICIPANT: &str =
    "SELECT conversation_id, user_id, role, joined_at, public_key, key_version FROM participants";

impl Database {
    /// Roster of a conversation, oldest member first.
    pub fn list_participants(&self, conversation_id: ConversationId) -> Result<Vec<Participant>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_PARTICIPANT} WHERE conversation_id = ?1 ORDER BY joined_at ASC, user_id ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_participant)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    pub fn get_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Participant> {
        self.conn()
            .query_row(
                &format!("{SELECT_PARTICIPANT} WHERE conversation_id = ?1 AND user_id = ?2"),
                params![conversation_id.to_string(), user_id.to_string()],
                row_to_participant,
            )
            .map_err(not_found)
    }

    /// Add one participant to an existing conversation. Fails on a duplicate
    /// `(conversation_id, user_id)`.
    pub fn add_participant(&self, participant: &Participant) -> Result<()> {
        insert_participant(self.conn(), participant)
    }

    /// Returns `true` if a row was deleted.
    pub fn remove_participant(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
            params![conversation_id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

pub(crate) fn insert_participant(conn: &Connection, participant: &Participant) -> Result<()> {
    conn.execute(
        "INSERT INTO participants
            (conversation_id, user_id, role, joined_at, public_key, key_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            participant.conversation_id.to_string(),
            participant.user_id.to_string(),
            participant.role.as_str(),
            ts(&participant.joined_at),
            participant.key.as_ref().map(|k| k.public_key.as_str()),
            participant.key.as_ref().map(|k| k.key_version),
        ],
    )?;
    Ok(())
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    let conversation_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let joined_at: String = row.get(3)?;
    let public_key: Option<String> = row.get(4)?;
    let key_version: Option<u32> = row.get(5)?;

    let role = ParticipantRole::parse(&role)
        .ok_or_else(|| invalid_column(2, format!("unknown participant role {role:?}")))?;

    let key = match (public_key, key_version) {
        (Some(public_key), Some(key_version)) => Some(KeySnapshot {
            public_key,
            key_version,
        }),
        _ => None,
    };

    Ok(Participant {
        conversation_id: parse_id(0, &conversation_id)?,
        user_id: parse_id(1, &user_id)?,
        role,
        joined_at: parse_ts(3, &joined_at)?,
        key,
    })
}
