//! CRUD operations for [`Conversation`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use luvvix_shared::{ConversationId, KeyWrap, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::key_wraps::replace_key_wraps;
use crate::models::{Conversation, ConversationKind, Participant};
use crate::participants::insert_participant;
use crate::sql::{invalid_column, not_found, parse_id, parse_ts, ts};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a conversation together with its initial roster and name wraps.
    /// All rows are written or none are.
    pub fn create_conversation(
        &self,
        conversation: &Conversation,
        participants: &[Participant],
        name_wraps: &[KeyWrap],
    ) -> Result<()> {
        if participants
            .iter()
            .any(|p| p.conversation_id != conversation.id)
        {
            return Err(StoreError::InvalidData(
                "participant belongs to another conversation".into(),
            ));
        }

        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO conversations (id, kind, encrypted_name, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conversation.id.to_string(),
                conversation.kind.as_str(),
                conversation.encrypted_name,
                conversation.created_by.to_string(),
                ts(&conversation.created_at),
                ts(&conversation.updated_at),
            ],
        )?;

        for participant in participants {
            insert_participant(&tx, participant)?;
        }
        replace_key_wraps(&tx, conversation.id.0, name_wraps)?;

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, kind, encrypted_name, created_by, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(not_found)
    }

    /// Conversations `user_id` participates in, most recent activity first.
    pub fn list_conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.kind, c.encrypted_name, c.created_by, c.created_at, c.updated_at
             FROM conversations c
             JOIN participants p ON p.conversation_id = c.id
             WHERE p.user_id = ?1
             ORDER BY c.updated_at DESC, c.created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the encoded name and its wraps, bumping `updated_at`.
    /// Returns `false` if the conversation does not exist.
    pub fn rename_conversation(
        &self,
        id: ConversationId,
        encrypted_name: Option<&str>,
        name_wraps: &[KeyWrap],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;

        let affected = tx.execute(
            "UPDATE conversations SET encrypted_name = ?1, updated_at = ?2 WHERE id = ?3",
            params![encrypted_name, ts(&now), id.to_string()],
        )?;
        if affected == 0 {
            return Ok(false);
        }
        replace_key_wraps(&tx, id.0, name_wraps)?;

        tx.commit()?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let encrypted_name: Option<String> = row.get(2)?;
    let created_by: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    let kind = ConversationKind::parse(&kind)
        .ok_or_else(|| invalid_column(1, format!("unknown conversation kind {kind:?}")))?;

    Ok(Conversation {
        id: parse_id(0, &id)?,
        kind,
        encrypted_name,
        created_by: parse_id(3, &created_by)?,
        created_at: parse_ts(4, &created_at)?,
        updated_at: parse_ts(5, &updated_at)?,
    })
}
