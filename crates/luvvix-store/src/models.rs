//! Domain model structs persisted in the relational store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use luvvix_shared::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// A user's published public key. One row per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub user_id: UserId,
    /// base64 X25519 public key.
    pub public_key: String,
    /// Starts at 1, bumped whenever a different key is published.
    pub key_version: u32,
    pub updated_at: DateTime<Utc>,
}

impl DirectoryEntry {
    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            public_key: self.public_key.clone(),
            key_version: self.key_version,
        }
    }
}

/// A public key as it was when captured into a participant or contact row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeySnapshot {
    pub public_key: String,
    pub key_version: u32,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Codec-encoded display name; `None` for unnamed (private) chats.
    pub encrypted_name: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    /// Bumped on rename and on every new message.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    /// Directory key captured at join time. `None` in plaintext conversations.
    pub key: Option<KeySnapshot>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Lifecycle of a message. A deleted message carries no content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MessageState {
    Active { content: String },
    Deleted,
}

impl MessageState {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Active { content } => Some(content),
            Self::Deleted => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Store-assigned insertion sequence; 0 until inserted.
    pub seq: i64,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub state: MessageState,
    pub sent_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub owner_id: UserId,
    pub contact_id: UserId,
    /// Name sealed to the owner's own public key.
    pub encrypted_name: Option<String>,
    pub key: KeySnapshot,
    pub added_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Device keys
// ---------------------------------------------------------------------------

/// A device's exported key pair as kept in the local [`crate::KeyVault`].
#[derive(Clone, PartialEq, Eq)]
pub struct StoredKeys {
    pub user_id: UserId,
    pub public_key: String,
    pub secret_key: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for StoredKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeys")
            .field("user_id", &self.user_id)
            .field("public_key", &self.public_key)
            .field("secret_key", &"..")
            .field("created_at", &self.created_at)
            .finish()
    }
}
