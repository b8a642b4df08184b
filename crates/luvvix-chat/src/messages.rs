//! Sending, listing and following messages.
//!
//! A [`MessageStore`] is bound to one viewer: everything it returns is decoded
//! with that viewer's key wraps. Content that cannot be decoded is returned as
//! [`MessageBody::Unreadable`] instead of failing the call, so one bad row
//! never hides the rest of a conversation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use luvvix_shared::constants::{PLACEHOLDER_DELETED, PLACEHOLDER_UNREADABLE};
use luvvix_shared::{
    Clock, ContentCodec, ConversationId, EncodedContent, KeyWrap, MessageId, UserId,
};
use luvvix_store::{Message, MessageKind, MessageState, RemoteStore};

use crate::conversations::{recipients_of, require_participant};
use crate::error::{not_found, ChatError, Result};

/// Replays after a feed overflow are retried this many times before the
/// subscription gives up.
const REPLAY_ATTEMPTS: u32 = 5;
const REPLAY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum MessageBody {
    Plain(String),
    Unreadable,
    Deleted,
}

impl MessageBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Plain(text) => Some(text),
            _ => None,
        }
    }
}

/// A message as seen by the viewer of a [`MessageStore`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DecodedMessage {
    pub id: MessageId,
    pub seq: i64,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl DecodedMessage {
    /// The text to render, with placeholders for unreadable and deleted
    /// messages.
    pub fn display_text(&self) -> &str {
        match &self.body {
            MessageBody::Plain(text) => text,
            MessageBody::Unreadable => PLACEHOLDER_UNREADABLE,
            MessageBody::Deleted => PLACEHOLDER_DELETED,
        }
    }
}

#[derive(Clone)]
pub struct MessageStore {
    store: RemoteStore,
    codec: Arc<dyn ContentCodec>,
    viewer: UserId,
    page_size: u32,
    clock: Arc<dyn Clock>,
}

impl MessageStore {
    pub fn new(
        store: RemoteStore,
        codec: Arc<dyn ContentCodec>,
        viewer: UserId,
        page_size: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            codec,
            viewer,
            page_size: page_size.max(1),
            clock,
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    // ------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------

    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
        plaintext: &str,
    ) -> Result<DecodedMessage> {
        self.send_typed(conversation_id, sender, plaintext, MessageKind::Text)
            .await
    }

    /// Encode `plaintext` for every participant's key snapshot and append it.
    /// Nothing is written unless every check and the encoding succeed.
    pub async fn send_typed(
        &self,
        conversation_id: ConversationId,
        sender: UserId,
        plaintext: &str,
        kind: MessageKind,
    ) -> Result<DecodedMessage> {
        if plaintext.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".into()));
        }
        require_participant(&self.store, conversation_id, sender).await?;

        let EncodedContent { body, wraps } = self.encode_for(conversation_id, plaintext).await?;
        let now = self.clock.now();
        let message = Message {
            id: MessageId::new(),
            seq: 0,
            conversation_id,
            sender_id: sender,
            kind,
            state: MessageState::Active { content: body },
            sent_at: now,
            edited_at: None,
        };

        let inserted = self.store.insert_message(message, wraps, now).await?;
        tracing::debug!(
            conversation = %conversation_id,
            message = %inserted.id,
            seq = inserted.seq,
            kind = kind.as_str(),
            "sent message"
        );

        Ok(DecodedMessage {
            body: MessageBody::Plain(plaintext.to_string()),
            ..decoded_shell(inserted)
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// The most recent page of a conversation, oldest first.
    pub async fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<DecodedMessage>> {
        self.list_recent(conversation_id, self.page_size).await
    }

    /// Up to `limit` newest messages, oldest first. Only participants may
    /// read a conversation.
    pub async fn list_recent(
        &self,
        conversation_id: ConversationId,
        limit: u32,
    ) -> Result<Vec<DecodedMessage>> {
        let viewer = self.viewer;
        require_participant(&self.store, conversation_id, viewer).await?;
        let (messages, wraps) = self
            .store
            .run(move |db| {
                let messages = db.list_recent_messages(conversation_id, limit)?;
                let ids: Vec<_> = messages.iter().map(|m| m.id.0).collect();
                let wraps = db.get_key_wraps_for(&ids, viewer)?;
                Ok((messages, wraps))
            })
            .await?;

        Ok(messages
            .into_iter()
            .map(|m| {
                let wrap = wraps.get(&m.id.0);
                self.decode(m, wrap)
            })
            .collect())
    }

    /// Messages committed after `after_seq`, in insertion order.
    async fn replay_after(
        &self,
        conversation_id: ConversationId,
        after_seq: i64,
    ) -> Result<Vec<DecodedMessage>> {
        let viewer = self.viewer;
        let (messages, wraps) = self
            .store
            .run(move |db| {
                let messages = db.messages_after(conversation_id, after_seq)?;
                let ids: Vec<_> = messages.iter().map(|m| m.id.0).collect();
                let wraps = db.get_key_wraps_for(&ids, viewer)?;
                Ok((messages, wraps))
            })
            .await?;

        Ok(messages
            .into_iter()
            .map(|m| {
                let wrap = wraps.get(&m.id.0);
                self.decode(m, wrap)
            })
            .collect())
    }

    /// Decode a single row fetched from the live feed.
    async fn decode_live(&self, message: Message) -> DecodedMessage {
        let (id, viewer) = (message.id, self.viewer);
        match self.store.run(move |db| db.get_key_wrap(id.0, viewer)).await {
            Ok(wrap) => self.decode(message, wrap.as_ref()),
            Err(e) => {
                tracing::warn!(message = %id, error = %e, "could not load key wrap");
                DecodedMessage {
                    body: MessageBody::Unreadable,
                    ..decoded_shell(message)
                }
            }
        }
    }

    fn decode(&self, message: Message, wrap: Option<&KeyWrap>) -> DecodedMessage {
        let body = match &message.state {
            MessageState::Deleted => MessageBody::Deleted,
            MessageState::Active { content } => match self.codec.decode(content, wrap) {
                Ok(text) => MessageBody::Plain(text),
                Err(e) => {
                    tracing::warn!(message = %message.id, error = %e, "could not decode message");
                    MessageBody::Unreadable
                }
            },
        };
        DecodedMessage {
            body,
            ..decoded_shell(message)
        }
    }

    // ------------------------------------------------------------------
    // Live feed
    // ------------------------------------------------------------------

    /// Call `on_message` for every message inserted into `conversation_id`
    /// from now on, in insertion order. If the feed overflows, the missed
    /// rows are replayed from the store before any later row is delivered,
    /// so a message may arrive twice; de-duplicate by id. When the replay
    /// keeps failing the subscription ends and [`Subscription::is_active`]
    /// turns false.
    pub async fn subscribe<F>(
        &self,
        conversation_id: ConversationId,
        on_message: F,
    ) -> Result<Subscription>
    where
        F: Fn(DecodedMessage) + Send + Sync + 'static,
    {
        require_participant(&self.store, conversation_id, self.viewer).await?;

        // Subscribe before reading the baseline so nothing falls in between.
        let mut feed = self.store.subscribe_inserts();
        let mut last_seq = self
            .store
            .run(move |db| db.latest_seq(conversation_id))
            .await?;

        let this = self.clone();
        let task = tokio::spawn(async move {
            let mut behind = false;
            let mut failures = 0u32;
            loop {
                if behind {
                    match this.replay_after(conversation_id, last_seq).await {
                        Ok(missed) => {
                            for message in missed {
                                if message.seq <= last_seq {
                                    continue;
                                }
                                last_seq = message.seq;
                                on_message(message);
                            }
                            behind = false;
                            failures = 0;
                        }
                        Err(e) => {
                            failures += 1;
                            if failures >= REPLAY_ATTEMPTS {
                                tracing::error!(
                                    conversation = %conversation_id,
                                    after_seq = last_seq,
                                    error = %e,
                                    "replay kept failing, ending subscription"
                                );
                                break;
                            }
                            tracing::warn!(
                                conversation = %conversation_id,
                                attempt = failures,
                                error = %e,
                                "replay failed, retrying"
                            );
                            tokio::time::sleep(REPLAY_BACKOFF * failures).await;
                            continue;
                        }
                    }
                }

                match feed.recv().await {
                    Ok(message) => {
                        if message.conversation_id != conversation_id || message.seq <= last_seq {
                            continue;
                        }
                        last_seq = message.seq;
                        on_message(this.decode_live(message).await);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            conversation = %conversation_id,
                            skipped,
                            after_seq = last_seq,
                            "message feed lagged, replaying from store"
                        );
                        behind = true;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(conversation = %conversation_id, "subscription ended");
        });

        tracing::debug!(conversation = %conversation_id, viewer = %self.viewer, "subscribed");
        Ok(Subscription { task })
    }

    // ------------------------------------------------------------------
    // Edit / delete
    // ------------------------------------------------------------------

    /// Replace the text of a message. Only its sender may edit it; the new
    /// content is encoded for the current roster.
    pub async fn edit_message(
        &self,
        id: MessageId,
        editor: UserId,
        plaintext: &str,
    ) -> Result<DecodedMessage> {
        if plaintext.is_empty() {
            return Err(ChatError::InvalidInput("message must not be empty".into()));
        }

        let message = self.load_own(id, editor).await?;
        if message.state.is_deleted() {
            return Err(ChatError::InvalidInput(format!("message {id} was deleted")));
        }

        let EncodedContent { body, wraps } =
            self.encode_for(message.conversation_id, plaintext).await?;
        let now = self.clock.now();
        let updated = self
            .store
            .run(move |db| db.update_message_content(id, &body, &wraps, now))
            .await?;
        if !updated {
            return Err(ChatError::NotFound(format!("message {id}")));
        }

        tracing::debug!(message = %id, "edited message");
        Ok(DecodedMessage {
            body: MessageBody::Plain(plaintext.to_string()),
            edited_at: Some(now),
            ..decoded_shell(message)
        })
    }

    /// Soft delete. Only the sender may delete; deleting twice is a no-op.
    pub async fn delete_message(&self, id: MessageId, caller: UserId) -> Result<()> {
        self.load_own(id, caller).await?;
        let deleted = self
            .store
            .run(move |db| db.soft_delete_message(id))
            .await?;
        if deleted {
            tracing::debug!(message = %id, "deleted message");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn load_own(&self, id: MessageId, user: UserId) -> Result<Message> {
        let message = self
            .store
            .run(move |db| db.get_message(id))
            .await
            .map_err(not_found(format!("message {id}")))?;
        if message.sender_id != user {
            return Err(ChatError::Forbidden(format!("{user} did not send message {id}")));
        }
        Ok(message)
    }

    async fn encode_for(
        &self,
        conversation_id: ConversationId,
        plaintext: &str,
    ) -> Result<EncodedContent> {
        let recipients = if self.codec.requires_keys() {
            let participants = self
                .store
                .run(move |db| db.list_participants(conversation_id))
                .await?;
            let recipients = recipients_of(&participants);
            if recipients.is_empty() {
                return Err(ChatError::NoRecipientKey(conversation_id));
            }
            recipients
        } else {
            Vec::new()
        };
        Ok(self.codec.encode(plaintext, &recipients)?)
    }
}

/// Handle to a live subscription. Dropping it stops delivery.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn decoded_shell(message: Message) -> DecodedMessage {
    DecodedMessage {
        id: message.id,
        seq: message.seq,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        kind: message.kind,
        body: MessageBody::Deleted,
        sent_at: message.sent_at,
        edited_at: message.edited_at,
    }
}
