//! Public key directory.
//!
//! Each user publishes the public half of their device key under their user
//! id; everyone else reads it from here before addressing them. Lookups go
//! through a TTL cache owned by the service.

use std::sync::Arc;
use std::time::Duration;

use luvvix_shared::keys::{self, PublicKey};
use luvvix_shared::{Clock, Recipient, UserId};
use luvvix_store::{DirectoryEntry, RemoteStore, StoreError};

use crate::cache::TtlCache;
use crate::error::{ChatError, Result};

pub struct DirectoryService {
    store: RemoteStore,
    cache: TtlCache<UserId, DirectoryEntry>,
    clock: Arc<dyn Clock>,
}

impl DirectoryService {
    pub fn new(
        store: RemoteStore,
        cache_capacity: usize,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_capacity, cache_ttl, clock.clone()),
            clock,
        }
    }

    /// Upsert the caller's public key. Safe to repeat.
    pub async fn publish_public_key(
        &self,
        user_id: UserId,
        public_key: &str,
    ) -> Result<DirectoryEntry> {
        keys::import_public_key(public_key)?;

        let public_key = public_key.to_string();
        let now = self.clock.now();
        let entry = self
            .store
            .run(move |db| db.upsert_directory_entry(user_id, &public_key, now))
            .await?;

        self.cache.invalidate(&user_id);
        tracing::info!(
            user = %user_id,
            key_version = entry.key_version,
            "published public key"
        );
        Ok(entry)
    }

    /// The published key of `user_id`, or [`ChatError::DirectoryLookup`].
    pub async fn fetch_public_key(&self, user_id: UserId) -> Result<String> {
        self.fetch_entry(user_id).await.map(|e| e.public_key)
    }

    /// Cached lookup. A key rotated by its owner can still be served from
    /// the cache until the entry expires; anything that snapshots keys into
    /// stored content goes through [`Self::refresh_entry`] instead.
    pub async fn fetch_entry(&self, user_id: UserId) -> Result<DirectoryEntry> {
        if let Some(entry) = self.cache.get(&user_id) {
            return Ok(entry);
        }
        self.refresh_entry(user_id).await
    }

    /// Read the entry from the store, bypassing and then refreshing the
    /// cache.
    pub async fn refresh_entry(&self, user_id: UserId) -> Result<DirectoryEntry> {
        let entry = self
            .store
            .run(move |db| db.get_directory_entry(user_id))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ChatError::DirectoryLookup(user_id),
                other => other.into(),
            })?;

        self.cache.insert(user_id, entry.clone());
        Ok(entry)
    }

    /// Resolve every user to an addressable recipient from their current
    /// published key. The first user without a published key fails the
    /// whole batch with [`ChatError::MissingKeyMaterial`].
    pub async fn resolve_recipients(&self, user_ids: &[UserId]) -> Result<Vec<(DirectoryEntry, PublicKey)>> {
        let mut resolved = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            let entry = match self.refresh_entry(user_id).await {
                Ok(entry) => entry,
                Err(ChatError::DirectoryLookup(id)) => return Err(ChatError::MissingKeyMaterial(id)),
                Err(e) => return Err(e),
            };
            let public_key = keys::import_public_key(&entry.public_key)?;
            resolved.push((entry, public_key));
        }
        Ok(resolved)
    }
}

/// Turn a resolved directory entry into a codec recipient.
pub(crate) fn recipient(entry: &DirectoryEntry, public_key: PublicKey) -> Recipient {
    Recipient {
        user_id: entry.user_id,
        key_version: entry.key_version,
        public_key,
    }
}
