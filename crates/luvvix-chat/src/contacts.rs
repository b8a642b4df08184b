//! Per-user address book.
//!
//! Contact names are private to their owner: each one is sealed to the
//! owner's own public key, so only the owning device can read it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use luvvix_shared::keys::{self, KeyPair};
use luvvix_shared::{Clock, UserId};
use luvvix_store::{Contact, RemoteStore};

use crate::directory::DirectoryService;
use crate::error::{ChatError, Result};

/// Placeholder for a contact name that cannot be opened on this device.
pub const PLACEHOLDER_CONTACT_NAME: &str = "[name unavailable]";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContactEntry {
    pub contact_id: UserId,
    pub name: Option<String>,
    pub public_key: String,
    pub key_version: u32,
    /// Human-comparable form of `public_key`.
    pub fingerprint: String,
    pub added_at: DateTime<Utc>,
}

pub struct ContactBook {
    store: RemoteStore,
    directory: Arc<DirectoryService>,
    owner: UserId,
    keys: KeyPair,
    clock: Arc<dyn Clock>,
}

impl ContactBook {
    pub fn new(
        store: RemoteStore,
        directory: Arc<DirectoryService>,
        owner: UserId,
        keys: KeyPair,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            owner,
            keys,
            clock,
        }
    }

    /// Add or update a contact. The contact must have published a key.
    pub async fn add_contact(
        &self,
        owner: UserId,
        contact_id: UserId,
        name: Option<&str>,
    ) -> Result<ContactEntry> {
        self.check_owner(owner)?;
        if contact_id == owner {
            return Err(ChatError::InvalidInput("cannot add yourself as a contact".into()));
        }

        let entry = self.directory.fetch_entry(contact_id).await?;
        let encrypted_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| keys::encrypt_message(n, &self.keys.public))
            .transpose()?;

        let contact = Contact {
            owner_id: owner,
            contact_id,
            encrypted_name,
            key: entry.snapshot(),
            added_at: self.clock.now(),
        };
        let row = contact.clone();
        self.store.run(move |db| db.upsert_contact(&row)).await?;

        tracing::info!(%owner, contact = %contact_id, "saved contact");
        Ok(self.decode(contact))
    }

    pub async fn list_contacts(&self, owner: UserId) -> Result<Vec<ContactEntry>> {
        self.check_owner(owner)?;
        let contacts = self.store.run(move |db| db.list_contacts(owner)).await?;
        Ok(contacts.into_iter().map(|c| self.decode(c)).collect())
    }

    /// Returns `false` if there was no such contact.
    pub async fn remove_contact(&self, owner: UserId, contact_id: UserId) -> Result<bool> {
        self.check_owner(owner)?;
        let removed = self
            .store
            .run(move |db| db.delete_contact(owner, contact_id))
            .await?;
        if removed {
            tracing::info!(%owner, contact = %contact_id, "removed contact");
        }
        Ok(removed)
    }

    fn check_owner(&self, owner: UserId) -> Result<()> {
        if owner != self.owner {
            return Err(ChatError::Forbidden(format!(
                "contacts of {owner} are not readable on this device"
            )));
        }
        Ok(())
    }

    fn decode(&self, contact: Contact) -> ContactEntry {
        let name = contact.encrypted_name.as_deref().map(|sealed| {
            keys::decrypt_message(sealed, &self.keys.secret).unwrap_or_else(|e| {
                tracing::warn!(contact = %contact.contact_id, error = %e, "could not open contact name");
                PLACEHOLDER_CONTACT_NAME.to_string()
            })
        });
        let fingerprint = keys::import_public_key(&contact.key.public_key)
            .map(|k| keys::fingerprint(&k))
            .unwrap_or_default();

        ContactEntry {
            contact_id: contact.contact_id,
            name,
            public_key: contact.key.public_key,
            key_version: contact.key.key_version,
            fingerprint,
            added_at: contact.added_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn contact_names_round_trip_for_the_owner() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let book = h.contacts(&alice);

        let added = book.add_contact(alice.id, bob.id, Some("Bob")).await.unwrap();
        assert_eq!(added.name.as_deref(), Some("Bob"));
        assert_eq!(added.key_version, 1);

        let listed = book.list_contacts(alice.id).await.unwrap();
        assert_eq!(listed, [added]);

        let raw = h
            .store
            .run(move |db| db.get_contact(alice.id, bob.id))
            .await
            .unwrap();
        assert_ne!(raw.encrypted_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn unpublished_contact_is_rejected() {
        let h = Harness::new();
        let alice = h.user().await;
        let stranger = UserId::new();

        let err = h
            .contacts(&alice)
            .add_contact(alice.id, stranger, Some("Who"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DirectoryLookup(id) if id == stranger));
    }

    #[tokio::test]
    async fn re_adding_updates_the_name() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let book = h.contacts(&alice);

        book.add_contact(alice.id, bob.id, Some("Bob")).await.unwrap();
        book.add_contact(alice.id, bob.id, Some("Robert")).await.unwrap();

        let listed = book.list_contacts(alice.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name.as_deref(), Some("Robert"));

        assert!(book.remove_contact(alice.id, bob.id).await.unwrap());
        assert!(!book.remove_contact(alice.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn other_owners_are_refused() {
        let h = Harness::new();
        let (alice, bob) = (h.user().await, h.user().await);
        let err = h.contacts(&alice).list_contacts(bob.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }
}
