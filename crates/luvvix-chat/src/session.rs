//! Session bootstrap.
//!
//! [`SecureChat::establish`] makes sure the user has a device key pair and
//! that the directory advertises it, then hands out the chat services bound
//! to that user's codec.

use std::sync::Arc;

use luvvix_shared::keys::{self, KeyPair};
use luvvix_shared::{Clock, ContentCodec, EnvelopeCodec, PlainCodec, SystemClock, UserId};
use luvvix_store::{Database, RemoteStore};

use crate::config::{ChatConfig, CodecKind};
use crate::contacts::ContactBook;
use crate::conversations::ConversationStore;
use crate::directory::DirectoryService;
use crate::error::{ChatError, Result};
use crate::keystore::KeyStore;
use crate::messages::MessageStore;

pub struct SecureChat {
    user_id: UserId,
    keys: KeyPair,
    directory: Arc<DirectoryService>,
    conversations: ConversationStore,
    messages: MessageStore,
    contacts: ContactBook,
}

impl SecureChat {
    /// Open the store and key vault named by `config` and establish a
    /// session for `user_id`.
    pub async fn from_config(config: &ChatConfig, user_id: UserId) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store_path = config.resolved_store_path()?;
        let keystore_path = config.resolved_keystore_path()?;
        let db = Database::open_at(&store_path)?;
        let keystore = KeyStore::open_at(&keystore_path, clock.clone())?;
        let store = RemoteStore::new(db, config.store_timeout, config.feed_capacity);

        Self::establish(user_id, &keystore, store, config, clock).await
    }

    /// Load (or create and save) the device key pair of `user_id` and publish
    /// it when the directory does not already carry it.
    pub async fn establish(
        user_id: UserId,
        keystore: &KeyStore,
        store: RemoteStore,
        config: &ChatConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (keys, generated) = match keystore.load_key_pair(user_id)? {
            Some(pair) => (pair, false),
            None => {
                let pair = KeyPair::generate()?;
                keystore.save_key_pair(user_id, &pair)?;
                tracing::info!(
                    user = %user_id,
                    fingerprint = %keys::fingerprint(&pair.public),
                    "generated device keys"
                );
                (pair, true)
            }
        };

        let directory = Arc::new(DirectoryService::new(
            store.clone(),
            config.directory_cache_capacity,
            config.directory_cache_ttl,
            clock.clone(),
        ));

        let exported = keys::export_public_key(&keys.public);
        if generated {
            directory.publish_public_key(user_id, &exported).await?;
        } else {
            match directory.refresh_entry(user_id).await {
                Ok(entry) if entry.public_key == exported => {}
                Ok(entry) => {
                    tracing::warn!(
                        user = %user_id,
                        previous_version = entry.key_version,
                        "directory advertises another key for this user; republishing this device's key"
                    );
                    directory.publish_public_key(user_id, &exported).await?;
                }
                Err(ChatError::DirectoryLookup(_)) => {
                    directory.publish_public_key(user_id, &exported).await?;
                }
                Err(e) => return Err(e),
            }
        }

        let codec: Arc<dyn ContentCodec> = match config.codec {
            CodecKind::Envelope => Arc::new(EnvelopeCodec::new(keys.secret.clone())),
            CodecKind::Plain => Arc::new(PlainCodec),
        };

        let conversations = ConversationStore::new(
            store.clone(),
            directory.clone(),
            codec.clone(),
            clock.clone(),
        );
        let messages = MessageStore::new(
            store.clone(),
            codec,
            user_id,
            config.message_page_size,
            clock.clone(),
        );
        let contacts = ContactBook::new(store, directory.clone(), user_id, keys.clone(), clock);

        tracing::info!(user = %user_id, codec = ?config.codec, "session established");
        Ok(Self {
            user_id,
            keys,
            directory,
            conversations,
            messages,
            contacts,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Fingerprint of this device's public key, for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        keys::fingerprint(&self.keys.public)
    }

    pub fn public_key(&self) -> String {
        keys::export_public_key(&self.keys.public)
    }

    pub fn directory(&self) -> &DirectoryService {
        &self.directory
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use luvvix_store::KeyVault;

    use super::*;

    fn parts() -> (KeyStore, RemoteStore, Arc<dyn Clock>) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let keystore = KeyStore::new(KeyVault::open_in_memory().unwrap(), clock.clone());
        let store = RemoteStore::new(Database::open_in_memory().unwrap(), Duration::from_secs(5), 16);
        (keystore, store, clock)
    }

    #[tokio::test]
    async fn first_session_generates_and_publishes() {
        let (keystore, store, clock) = parts();
        let user = UserId::new();

        let chat = SecureChat::establish(user, &keystore, store, &ChatConfig::default(), clock)
            .await
            .unwrap();

        assert!(keystore.load_keys(user).unwrap().is_some());
        let published = chat.directory().fetch_public_key(user).await.unwrap();
        assert_eq!(published, chat.public_key());
    }

    #[tokio::test]
    async fn reestablishing_keeps_the_key_version() {
        let (keystore, store, clock) = parts();
        let user = UserId::new();
        let config = ChatConfig::default();

        let first = SecureChat::establish(user, &keystore, store.clone(), &config, clock.clone())
            .await
            .unwrap();
        let second = SecureChat::establish(user, &keystore, store, &config, clock)
            .await
            .unwrap();

        assert_eq!(first.fingerprint(), second.fingerprint());
        let entry = second.directory().fetch_entry(user).await.unwrap();
        assert_eq!(entry.key_version, 1);
    }

    #[tokio::test]
    async fn missing_directory_entry_is_republished() {
        let (keystore, store, clock) = parts();
        let user = UserId::new();
        keystore.save_key_pair(user, &KeyPair::generate().unwrap()).unwrap();

        let chat = SecureChat::establish(user, &keystore, store, &ChatConfig::default(), clock)
            .await
            .unwrap();
        assert_eq!(
            chat.directory().fetch_public_key(user).await.unwrap(),
            chat.public_key()
        );
    }

    #[tokio::test]
    async fn plain_codec_session_round_trips_text() {
        let (keystore, store, clock) = parts();
        let config = ChatConfig {
            codec: CodecKind::Plain,
            ..ChatConfig::default()
        };
        let (alice, bob) = (UserId::new(), UserId::new());

        let a = SecureChat::establish(alice, &keystore, store.clone(), &config, clock.clone())
            .await
            .unwrap();
        let b = SecureChat::establish(bob, &keystore, store, &config, clock)
            .await
            .unwrap();

        let conv = a.conversations().create_private_conversation(alice, bob).await.unwrap();
        a.messages().send_message(conv, alice, "in the clear").await.unwrap();
        let seen = b.messages().list_messages(conv).await.unwrap();
        assert_eq!(seen[0].display_text(), "in the clear");
    }
}
