use std::sync::Arc;
use std::time::Duration;

use luvvix_shared::keys::{self, KeyPair};
use luvvix_shared::{ContentCodec, EnvelopeCodec, ManualClock, PlainCodec, UserId};
use luvvix_store::{Database, RemoteStore};

use crate::contacts::ContactBook;
use crate::conversations::ConversationStore;
use crate::directory::DirectoryService;
use crate::messages::MessageStore;

pub(crate) struct TestUser {
    pub id: UserId,
    pub keys: KeyPair,
}

/// One shared in-memory store with a manual clock, and per-user services on
/// top of it.
pub(crate) struct Harness {
    pub store: RemoteStore,
    pub directory: Arc<DirectoryService>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Duration::from_secs(5), 64)
    }

    /// A harness whose store has the given deadline and live feed capacity.
    pub fn with_store(timeout: Duration, feed_capacity: usize) -> Self {
        let clock = Arc::new(ManualClock::default());
        let store = RemoteStore::new(Database::open_in_memory().unwrap(), timeout, feed_capacity);
        let directory = Arc::new(DirectoryService::new(
            store.clone(),
            64,
            Duration::from_secs(300),
            clock.clone(),
        ));
        Self {
            store,
            directory,
            clock,
        }
    }

    /// A user whose key is already in the directory.
    pub async fn user(&self) -> TestUser {
        let keys = KeyPair::generate().unwrap();
        let id = UserId::new();
        self.directory
            .publish_public_key(id, &keys::export_public_key(&keys.public))
            .await
            .unwrap();
        TestUser { id, keys }
    }

    fn codec(user: &TestUser) -> Arc<dyn ContentCodec> {
        Arc::new(EnvelopeCodec::new(user.keys.secret.clone()))
    }

    pub fn conversations(&self, user: &TestUser) -> ConversationStore {
        ConversationStore::new(
            self.store.clone(),
            self.directory.clone(),
            Self::codec(user),
            self.clock.clone(),
        )
    }

    pub fn plain_conversations(&self) -> ConversationStore {
        ConversationStore::new(
            self.store.clone(),
            self.directory.clone(),
            Arc::new(PlainCodec),
            self.clock.clone(),
        )
    }

    pub fn messages(&self, user: &TestUser) -> MessageStore {
        self.messages_with_codec(user, Self::codec(user))
    }

    pub fn messages_with_codec(&self, user: &TestUser, codec: Arc<dyn ContentCodec>) -> MessageStore {
        MessageStore::new(self.store.clone(), codec, user.id, 50, self.clock.clone())
    }

    pub fn contacts(&self, user: &TestUser) -> ContactBook {
        ContactBook::new(
            self.store.clone(),
            self.directory.clone(),
            user.id,
            user.keys.clone(),
            self.clock.clone(),
        )
    }
}
