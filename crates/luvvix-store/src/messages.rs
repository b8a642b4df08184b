use chrono::{DateTime, Utc};
use rusqlite::params;

use luvvix_shared::{ConversationId, KeyWrap, MessageId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::key_wraps::replace_key_wraps;
use crate::models::{Message, MessageKind, MessageState};
use crate::sql::{invalid_column, not_found, parse_id, parse_ts, ts};

const SELECT_MESSAGE: &str = "SELECT seq, id, conversation_id, sender_id, kind, content, is_deleted, sent_at, edited_at
     FROM messages";

impl Database {
    /// Append a message with its key wraps and bump the parent
    /// conversation's `updated_at` to `touched_at`, atomically.
    ///
    /// Returns the message with its store-assigned `seq`.
    pub fn insert_message(
        &self,
        message: &Message,
        wraps: &[KeyWrap],
        touched_at: DateTime<Utc>,
    ) -> Result<Message> {
        self.insert_message_gated(message, wraps, touched_at, || true)
    }

    /// [`Self::insert_message`], asking `may_commit` right before the
    /// commit. When it answers `false` the transaction is rolled back and
    /// nothing is written.
    pub fn insert_message_gated(
        &self,
        message: &Message,
        wraps: &[KeyWrap],
        touched_at: DateTime<Utc>,
        may_commit: impl FnOnce() -> bool,
    ) -> Result<Message> {
        let content = message
            .state
            .content()
            .ok_or_else(|| StoreError::InvalidData("cannot insert a deleted message".into()))?;

        let tx = self.conn().unchecked_transaction()?;

        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, kind, content, is_deleted, sent_at, edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.kind.as_str(),
                content,
                ts(&message.sent_at),
                message.edited_at.as_ref().map(ts),
            ],
        )?;
        let seq = tx.last_insert_rowid();

        replace_key_wraps(&tx, message.id.0, wraps)?;

        let touched = tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![ts(&touched_at), message.conversation_id.to_string()],
        )?;
        if touched == 0 {
            return Err(StoreError::NotFound);
        }

        if !may_commit() {
            return Err(StoreError::Unavailable("write abandoned before commit".into()));
        }
        tx.commit()?;

        Ok(Message {
            seq,
            ..message.clone()
        })
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_MESSAGE} WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// The newest `limit` messages of a conversation, returned oldest first.
    pub fn list_recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE}
             WHERE conversation_id = ?1
             ORDER BY sent_at DESC, seq DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![conversation_id.to_string(), limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Messages inserted after `after_seq`, in insertion order.
    pub fn messages_after(
        &self,
        conversation_id: ConversationId,
        after_seq: i64,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ?1 AND seq > ?2 ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id.to_string(), after_seq], row_to_message)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Highest `seq` in a conversation, or 0 if it has no messages.
    pub fn latest_seq(&self, conversation_id: ConversationId) -> Result<i64> {
        let seq = self.conn().query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    /// Replace the content (and wraps) of an active message. Returns `false`
    /// if the message is missing or deleted.
    pub fn update_message_content(
        &self,
        id: MessageId,
        content: &str,
        wraps: &[KeyWrap],
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;

        let affected = tx.execute(
            "UPDATE messages SET content = ?1, edited_at = ?2 WHERE id = ?3 AND is_deleted = 0",
            params![content, ts(&edited_at), id.to_string()],
        )?;
        if affected == 0 {
            return Ok(false);
        }
        replace_key_wraps(&tx, id.0, wraps)?;

        tx.commit()?;
        Ok(true)
    }

    /// Soft delete: content and wraps are dropped, the row stays for ordering.
    pub fn soft_delete_message(&self, id: MessageId) -> Result<bool> {
        let tx = self.conn().unchecked_transaction()?;

        let affected = tx.execute(
            "UPDATE messages SET content = NULL, is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
            params![id.to_string()],
        )?;
        replace_key_wraps(&tx, id.0, &[])?;

        tx.commit()?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let seq: i64 = row.get(0)?;
    let id: String = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let sender_id: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let content: Option<String> = row.get(5)?;
    let is_deleted: bool = row.get(6)?;
    let sent_at: String = row.get(7)?;
    let edited_at: Option<String> = row.get(8)?;

    let kind = MessageKind::parse(&kind)
        .ok_or_else(|| invalid_column(4, format!("unknown message kind {kind:?}")))?;

    let state = match (is_deleted, content) {
        (false, Some(content)) => MessageState::Active { content },
        (true, None) => MessageState::Deleted,
        _ => return Err(invalid_column(5, "content does not match deletion flag".into())),
    };

    Ok(Message {
        id: parse_id(1, &id)?,
        seq,
        conversation_id: parse_id(2, &conversation_id)?,
        sender_id: parse_id(3, &sender_id)?,
        kind,
        state,
        sent_at: parse_ts(7, &sent_at)?,
        edited_at: edited_at.as_deref().map(|s| parse_ts(8, s)).transpose()?,
    })
}
