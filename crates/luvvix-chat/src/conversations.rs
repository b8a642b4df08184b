//! Conversations and their rosters.
//!
//! Every participant row carries the directory key the participant had when
//! they joined; names and messages are encoded for those snapshots, never for
//! whatever the directory says later.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use luvvix_shared::constants::PLACEHOLDER_NAME;
use luvvix_shared::keys;
use luvvix_shared::{Clock, ContentCodec, ConversationId, EncodedContent, Recipient, UserId};
use luvvix_store::{
    Conversation, ConversationKind, KeySnapshot, Participant, ParticipantRole, RemoteStore,
    StoreError,
};

use crate::directory::{self, DirectoryService};
use crate::error::{ChatError, Result};

/// A conversation as shown to one user, name already decoded.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// `None` for unnamed chats; [`PLACEHOLDER_NAME`] when the name could not
    /// be decoded for this user.
    pub name: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ConversationStore {
    store: RemoteStore,
    directory: Arc<DirectoryService>,
    codec: Arc<dyn ContentCodec>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(
        store: RemoteStore,
        directory: Arc<DirectoryService>,
        codec: Arc<dyn ContentCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            codec,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Start a two-party chat. Both keys must resolve before anything is
    /// written. Calling this twice yields two conversations; use
    /// [`Self::open_private_conversation`] to reuse an existing one.
    pub async fn create_private_conversation(
        &self,
        initiator: UserId,
        other: UserId,
    ) -> Result<ConversationId> {
        if initiator == other {
            return Err(ChatError::InvalidInput(
                "cannot start a private conversation with yourself".into(),
            ));
        }

        let snapshots = self.snapshot_keys(&[initiator, other]).await?;
        let now = self.clock.now();
        let conversation = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Private,
            encrypted_name: None,
            created_by: initiator,
            created_at: now,
            updated_at: now,
        };
        let participants = roster(conversation.id, initiator, snapshots, now);

        let id = conversation.id;
        self.store
            .run(move |db| db.create_conversation(&conversation, &participants, &[]))
            .await?;

        tracing::info!(conversation = %id, %initiator, %other, "created private conversation");
        Ok(id)
    }

    /// First private conversation between exactly `user` and `other`.
    pub async fn find_private_conversation(
        &self,
        user: UserId,
        other: UserId,
    ) -> Result<Option<ConversationId>> {
        if user == other {
            return Ok(None);
        }

        let found = self
            .store
            .run(move |db| {
                for conversation in db.list_conversations_for_user(user)? {
                    if conversation.kind != ConversationKind::Private {
                        continue;
                    }
                    let roster = db.list_participants(conversation.id)?;
                    if roster.len() == 2 && roster.iter().any(|p| p.user_id == other) {
                        return Ok(Some(conversation.id));
                    }
                }
                Ok(None)
            })
            .await?;
        Ok(found)
    }

    pub async fn open_private_conversation(
        &self,
        user: UserId,
        other: UserId,
    ) -> Result<ConversationId> {
        match self.find_private_conversation(user, other).await? {
            Some(id) => Ok(id),
            None => self.create_private_conversation(user, other).await,
        }
    }

    /// Create a named group. The initiator is always an admin; other ids are
    /// deduplicated. One unresolvable key aborts the whole creation.
    pub async fn create_group_conversation(
        &self,
        initiator: UserId,
        name: &str,
        participant_ids: &[UserId],
    ) -> Result<ConversationId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidInput("group name must not be empty".into()));
        }

        let mut seen = HashSet::from([initiator]);
        let mut members = vec![initiator];
        members.extend(participant_ids.iter().copied().filter(|id| seen.insert(*id)));

        let snapshots = self.snapshot_keys(&members).await?;
        let recipients: Vec<Recipient> = snapshots
            .iter()
            .filter_map(|(_, resolved)| resolved.as_ref().map(|(_, r)| r.clone()))
            .collect();
        let EncodedContent { body, wraps } = self.codec.encode(name, &recipients)?;

        let now = self.clock.now();
        let conversation = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Group,
            encrypted_name: Some(body),
            created_by: initiator,
            created_at: now,
            updated_at: now,
        };
        let participants = roster(conversation.id, initiator, snapshots, now);
        let count = participants.len();

        let id = conversation.id;
        self.store
            .run(move |db| db.create_conversation(&conversation, &participants, &wraps))
            .await?;

        tracing::info!(conversation = %id, %initiator, participants = count, "created group conversation");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Rename a conversation, re-encoding the name for the current roster.
    pub async fn rename_conversation(
        &self,
        id: ConversationId,
        new_name: &str,
        caller: UserId,
    ) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(ChatError::InvalidInput("conversation name must not be empty".into()));
        }

        self.require_participant(id, caller).await?;
        let participants = self.list_participants(id).await?;
        let recipients = recipients_of(&participants);
        if self.codec.requires_keys() && recipients.is_empty() {
            return Err(ChatError::NoRecipientKey(id));
        }

        let EncodedContent { body, wraps } = self.codec.encode(new_name, &recipients)?;
        let now = self.clock.now();
        let renamed = self
            .store
            .run(move |db| db.rename_conversation(id, Some(body.as_str()), &wraps, now))
            .await?;
        if !renamed {
            return Err(ChatError::NotFound(format!("conversation {id}")));
        }

        tracing::info!(conversation = %id, %caller, "renamed conversation");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Conversations of `user`, most recent activity first. A name that
    /// cannot be decoded becomes [`PLACEHOLDER_NAME`]; it never fails the
    /// listing.
    pub async fn list_conversations(&self, user: UserId) -> Result<Vec<ConversationSummary>> {
        let (conversations, wraps) = self
            .store
            .run(move |db| {
                let conversations = db.list_conversations_for_user(user)?;
                let named: Vec<_> = conversations
                    .iter()
                    .filter(|c| c.encrypted_name.is_some())
                    .map(|c| c.id.0)
                    .collect();
                let wraps = db.get_key_wraps_for(&named, user)?;
                Ok((conversations, wraps))
            })
            .await?;

        Ok(conversations
            .into_iter()
            .map(|c| {
                let name = c.encrypted_name.as_deref().map(|body| {
                    self.codec.decode(body, wraps.get(&c.id.0)).unwrap_or_else(|e| {
                        tracing::warn!(conversation = %c.id, error = %e, "could not decode conversation name");
                        PLACEHOLDER_NAME.to_string()
                    })
                });
                ConversationSummary {
                    id: c.id,
                    kind: c.kind,
                    name,
                    created_by: c.created_by,
                    created_at: c.created_at,
                    updated_at: c.updated_at,
                }
            })
            .collect())
    }

    pub async fn list_participants(&self, id: ConversationId) -> Result<Vec<Participant>> {
        Ok(self.store.run(move |db| db.list_participants(id)).await?)
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    /// Admins only. The newcomer gets wraps for content written from now on;
    /// earlier messages stay unreadable to them.
    pub async fn add_participant(
        &self,
        id: ConversationId,
        user: UserId,
        caller: UserId,
    ) -> Result<Participant> {
        self.require_admin(id, caller).await?;

        let exists = self
            .store
            .run(move |db| match db.get_participant(id, user) {
                Ok(_) => Ok(true),
                Err(StoreError::NotFound) => Ok(false),
                Err(e) => Err(e),
            })
            .await?;
        if exists {
            return Err(ChatError::InvalidInput(format!("{user} is already a participant")));
        }

        let key = match self.snapshot_keys(&[user]).await?.pop() {
            Some((_, Some((snapshot, _)))) => Some(snapshot),
            _ => None,
        };
        let participant = Participant {
            conversation_id: id,
            user_id: user,
            role: ParticipantRole::Member,
            joined_at: self.clock.now(),
            key,
        };

        let row = participant.clone();
        self.store.run(move |db| db.add_participant(&row)).await?;

        tracing::info!(conversation = %id, %user, %caller, "added participant");
        Ok(participant)
    }

    /// Admins may remove anyone; members may only remove themselves. The
    /// last admin cannot leave while other participants remain.
    pub async fn remove_participant(
        &self,
        id: ConversationId,
        user: UserId,
        caller: UserId,
    ) -> Result<()> {
        if caller != user {
            self.require_admin(id, caller).await?;
        }

        let outcome = self
            .store
            .run(move |db| {
                let roster = db.list_participants(id)?;
                let Some(target) = roster.iter().find(|p| p.user_id == user) else {
                    return Ok(Removal::Missing);
                };
                let admins = roster
                    .iter()
                    .filter(|p| p.role == ParticipantRole::Admin)
                    .count();
                if target.role == ParticipantRole::Admin && admins == 1 && roster.len() > 1 {
                    return Ok(Removal::LastAdmin);
                }
                Ok(if db.remove_participant(id, user)? {
                    Removal::Removed
                } else {
                    Removal::Missing
                })
            })
            .await?;
        match outcome {
            Removal::Removed => {}
            Removal::Missing => {
                return Err(ChatError::NotFound(format!("participant {user} in {id}")));
            }
            Removal::LastAdmin => {
                return Err(ChatError::InvalidInput(format!(
                    "{user} is the last admin of {id}"
                )));
            }
        }

        tracing::info!(conversation = %id, %user, %caller, "removed participant");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Directory snapshots for `users`, in order. With a keyless codec no
    /// lookup happens and every snapshot is `None`.
    async fn snapshot_keys(
        &self,
        users: &[UserId],
    ) -> Result<Vec<(UserId, Option<(KeySnapshot, Recipient)>)>> {
        if !self.codec.requires_keys() {
            return Ok(users.iter().map(|u| (*u, None)).collect());
        }

        let resolved = self.directory.resolve_recipients(users).await?;
        Ok(resolved
            .into_iter()
            .map(|(entry, public_key)| {
                let recipient = directory::recipient(&entry, public_key);
                (entry.user_id, Some((entry.snapshot(), recipient)))
            })
            .collect())
    }

    async fn require_participant(&self, id: ConversationId, user: UserId) -> Result<Participant> {
        require_participant(&self.store, id, user).await
    }

    async fn require_admin(&self, id: ConversationId, user: UserId) -> Result<()> {
        let participant = self.require_participant(id, user).await?;
        if participant.role != ParticipantRole::Admin {
            return Err(ChatError::Forbidden(format!("{user} is not an admin of {id}")));
        }
        Ok(())
    }
}

enum Removal {
    Removed,
    Missing,
    LastAdmin,
}

/// The participant row of `user`, or [`ChatError::Forbidden`] if they are
/// not in the conversation (or it does not exist).
pub(crate) async fn require_participant(
    store: &RemoteStore,
    id: ConversationId,
    user: UserId,
) -> Result<Participant> {
    store
        .run(move |db| db.get_participant(id, user))
        .await
        .map_err(|e| match e {
            StoreError::NotFound => {
                ChatError::Forbidden(format!("{user} is not a participant of {id}"))
            }
            other => other.into(),
        })
}

/// Recipients for the key snapshots of a roster. Participants without a
/// usable snapshot are skipped.
pub(crate) fn recipients_of(participants: &[Participant]) -> Vec<Recipient> {
    participants
        .iter()
        .filter_map(|p| {
            let snapshot = p.key.as_ref()?;
            match keys::import_public_key(&snapshot.public_key) {
                Ok(public_key) => Some(Recipient {
                    user_id: p.user_id,
                    key_version: snapshot.key_version,
                    public_key,
                }),
                Err(e) => {
                    tracing::warn!(user = %p.user_id, error = %e, "skipping participant with bad key snapshot");
                    None
                }
            }
        })
        .collect()
}

fn roster(
    id: ConversationId,
    initiator: UserId,
    snapshots: Vec<(UserId, Option<(KeySnapshot, Recipient)>)>,
    joined_at: DateTime<Utc>,
) -> Vec<Participant> {
    snapshots
        .into_iter()
        .map(|(user_id, resolved)| Participant {
            conversation_id: id,
            user_id,
            role: if user_id == initiator {
                ParticipantRole::Admin
            } else {
                ParticipantRole::Member
            },
            joined_at,
            key: resolved.map(|(snapshot, _)| snapshot),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn private_conversation_needs_both_keys() {
        let h = Harness::new();
        let alice = h.user().await;
        let stranger = UserId::new();

        let err = h
            .conversations(&alice)
            .create_private_conversation(alice.id, stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MissingKeyMaterial(id) if id == stranger));

        let listed = h.conversations(&alice).list_conversations(alice.id).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn private_conversation_roster() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let store = h.conversations(&alice);

        let id = store.create_private_conversation(alice.id, bob.id).await.unwrap();
        let roster = store.list_participants(id).await.unwrap();

        assert_eq!(roster.len(), 2);
        let admin = roster.iter().find(|p| p.user_id == alice.id).unwrap();
        assert_eq!(admin.role, ParticipantRole::Admin);
        assert!(roster.iter().all(|p| p.key.as_ref().map(|k| k.key_version) == Some(1)));
    }

    #[tokio::test]
    async fn open_reuses_existing_private_conversation() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let store = h.conversations(&alice);

        let first = store.open_private_conversation(alice.id, bob.id).await.unwrap();
        let again = store.open_private_conversation(alice.id, bob.id).await.unwrap();
        assert_eq!(first, again);

        let fresh = store.create_private_conversation(alice.id, bob.id).await.unwrap();
        assert_ne!(first, fresh);
    }

    #[tokio::test]
    async fn group_creation_dedupes_and_adds_initiator() {
        let h = Harness::new();
        let (alice, bob, carol) = (h.user().await, h.user().await, h.user().await);
        let store = h.conversations(&alice);

        let id = store
            .create_group_conversation(alice.id, "Team", &[bob.id, carol.id, bob.id])
            .await
            .unwrap();

        let roster = store.list_participants(id).await.unwrap();
        assert_eq!(roster.len(), 3);
        let admins: Vec<_> = roster
            .iter()
            .filter(|p| p.role == ParticipantRole::Admin)
            .map(|p| p.user_id)
            .collect();
        assert_eq!(admins, [alice.id]);
    }

    #[tokio::test]
    async fn group_creation_aborts_on_missing_key() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let stranger = UserId::new();
        let store = h.conversations(&alice);

        let err = store
            .create_group_conversation(alice.id, "Team", &[bob.id, stranger])
            .await
            .unwrap_err();
        assert!(err.is_missing_keys());
        assert!(store.list_conversations(alice.id).await.unwrap().is_empty());
        assert!(h.conversations(&bob).list_conversations(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_name_is_readable_by_every_member() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        h.conversations(&alice)
            .create_group_conversation(alice.id, "Book club", &[bob.id])
            .await
            .unwrap();

        for user in [&alice, &bob] {
            let listed = h.conversations(user).list_conversations(user.id).await.unwrap();
            assert_eq!(listed[0].name.as_deref(), Some("Book club"));
        }
    }

    #[tokio::test]
    async fn rename_reencrypts_for_all_and_bumps_order() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let store = h.conversations(&alice);

        let group = store
            .create_group_conversation(alice.id, "Old", &[bob.id])
            .await
            .unwrap();
        h.clock.advance(Duration::seconds(1));
        let private = store.create_private_conversation(alice.id, bob.id).await.unwrap();
        h.clock.advance(Duration::seconds(1));

        h.conversations(&bob)
            .rename_conversation(group, "New", bob.id)
            .await
            .unwrap();

        let listed = h.conversations(&alice).list_conversations(alice.id).await.unwrap();
        assert_eq!(listed.iter().map(|c| c.id).collect::<Vec<_>>(), [group, private]);
        assert_eq!(listed[0].name.as_deref(), Some("New"));
        assert_eq!(listed[1].name, None);

        let for_bob = h.conversations(&bob).list_conversations(bob.id).await.unwrap();
        assert_eq!(for_bob[0].name.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn outsiders_cannot_rename() {
        let h = Harness::new();
        let (alice, bob, mallory) = (h.user().await, h.user().await, h.user().await);
        let group = h
            .conversations(&alice)
            .create_group_conversation(alice.id, "Private", &[bob.id])
            .await
            .unwrap();

        let err = h
            .conversations(&mallory)
            .rename_conversation(group, "Mine", mallory.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }

    #[tokio::test]
    async fn undecodable_name_becomes_placeholder() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let group = h
            .conversations(&alice)
            .create_group_conversation(alice.id, "Secret", &[bob.id])
            .await
            .unwrap();

        // A codec holding the wrong secret cannot open bob's wrap.
        let wrong = h.user().await;
        let listed = h.conversations(&wrong).list_conversations(bob.id).await.unwrap();
        assert_eq!(listed[0].id, group);
        assert_eq!(listed[0].name.as_deref(), Some(PLACEHOLDER_NAME));
    }

    #[tokio::test]
    async fn roster_changes_follow_roles() {
        let h = Harness::new();
        let (alice, bob, carol) = (h.user().await, h.user().await, h.user().await);
        let store = h.conversations(&alice);
        let group = store
            .create_group_conversation(alice.id, "Team", &[bob.id])
            .await
            .unwrap();

        let err = store.add_participant(group, carol.id, bob.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        let added = store.add_participant(group, carol.id, alice.id).await.unwrap();
        assert_eq!(added.role, ParticipantRole::Member);
        assert!(added.key.is_some());

        let err = store.remove_participant(group, carol.id, bob.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));

        store.remove_participant(group, bob.id, bob.id).await.unwrap();
        store.remove_participant(group, carol.id, alice.id).await.unwrap();
        let roster = store.list_participants(group).await.unwrap();
        assert_eq!(roster.iter().map(|p| p.user_id).collect::<Vec<_>>(), [alice.id]);
    }

    #[tokio::test]
    async fn plain_codec_skips_key_resolution() {
        let h = Harness::new();
        let alice = h.user().await;
        let keyless = UserId::new();
        let store = h.plain_conversations();

        let group = store
            .create_group_conversation(alice.id, "Open", &[keyless])
            .await
            .unwrap();

        let listed = store.list_conversations(keyless).await.unwrap();
        assert_eq!(listed[0].id, group);
        assert_eq!(listed[0].name.as_deref(), Some("Open"));
        assert!(store
            .list_participants(group)
            .await
            .unwrap()
            .iter()
            .all(|p| p.key.is_none()));
    }

    #[tokio::test]
    async fn last_admin_cannot_leave_a_populated_group() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let store = h.conversations(&alice);
        let group = store
            .create_group_conversation(alice.id, "Team", &[bob.id])
            .await
            .unwrap();

        let err = store.remove_participant(group, alice.id, alice.id).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        let roster = store.list_participants(group).await.unwrap();
        assert_eq!(roster.len(), 2);

        // Once alone, the admin may leave.
        store.remove_participant(group, bob.id, alice.id).await.unwrap();
        store.remove_participant(group, alice.id, alice.id).await.unwrap();
        assert!(store.list_participants(group).await.unwrap().is_empty());
    }
}
