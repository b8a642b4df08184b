//! Per-device persistence of each user's key pair.

use std::path::Path;
use std::sync::{Arc, Mutex};

use luvvix_shared::keys::{self, KeyPair};
use luvvix_shared::{Clock, UserId};
use luvvix_store::{KeyVault, StoredKeys};

use crate::error::{ChatError, Result};

pub struct KeyStore {
    vault: Mutex<KeyVault>,
    clock: Arc<dyn Clock>,
}

impl KeyStore {
    pub fn new(vault: KeyVault, clock: Arc<dyn Clock>) -> Self {
        Self {
            vault: Mutex::new(vault),
            clock,
        }
    }

    pub fn open_at(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::new(KeyVault::open_at(path)?, clock))
    }

    /// The stored pair for `user_id`, or `None` if this device has none.
    pub fn load_keys(&self, user_id: UserId) -> Result<Option<StoredKeys>> {
        let vault = self.lock()?;
        Ok(vault.load_keys(user_id)?)
    }

    /// Store (or replace) the exported pair for `user_id`.
    pub fn save_keys(&self, user_id: UserId, public_key: &str, secret_key: &str) -> Result<()> {
        let vault = self.lock()?;
        vault.save_keys(user_id, public_key, secret_key, self.clock.now())?;
        tracing::debug!(user = %user_id, "saved device keys");
        Ok(())
    }

    /// Load and import the stored pair. A stored public key that does not
    /// match its secret half is reported as a key import failure.
    pub fn load_key_pair(&self, user_id: UserId) -> Result<Option<KeyPair>> {
        let Some(stored) = self.load_keys(user_id)? else {
            return Ok(None);
        };

        let secret = keys::import_secret_key(&stored.secret_key)?;
        let public = keys::import_public_key(&stored.public_key)?;
        let pair = KeyPair::from_secret(secret);
        if pair.public != public {
            return Err(luvvix_shared::CryptoError::KeyImport(
                "stored public key does not match secret key".into(),
            )
            .into());
        }
        Ok(Some(pair))
    }

    pub fn save_key_pair(&self, user_id: UserId, pair: &KeyPair) -> Result<()> {
        self.save_keys(
            user_id,
            &keys::export_public_key(&pair.public),
            &keys::export_secret_key(&pair.secret),
        )
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, KeyVault>> {
        self.vault
            .lock()
            .map_err(|e| ChatError::TransientStore(format!("key vault lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use luvvix_shared::SystemClock;

    use super::*;

    fn keystore() -> KeyStore {
        KeyStore::new(KeyVault::open_in_memory().unwrap(), Arc::new(SystemClock))
    }

    #[test]
    fn not_found_is_none_not_error() {
        let store = keystore();
        assert!(store.load_keys(UserId::new()).unwrap().is_none());
        assert!(store.load_key_pair(UserId::new()).unwrap().is_none());
    }

    #[test]
    fn key_pair_round_trips() {
        let store = keystore();
        let user = UserId::new();
        let pair = KeyPair::generate().unwrap();

        store.save_key_pair(user, &pair).unwrap();
        let loaded = store.load_key_pair(user).unwrap().unwrap();
        assert_eq!(loaded.public, pair.public);
    }

    #[test]
    fn save_is_idempotent() {
        let store = keystore();
        let user = UserId::new();
        let pair = KeyPair::generate().unwrap();

        store.save_key_pair(user, &pair).unwrap();
        store.save_key_pair(user, &pair).unwrap();
        assert_eq!(store.load_key_pair(user).unwrap().unwrap().public, pair.public);
    }

    #[test]
    fn mismatched_halves_are_rejected() {
        let store = keystore();
        let user = UserId::new();
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();

        store
            .save_keys(
                user,
                &keys::export_public_key(&a.public),
                &keys::export_secret_key(&b.secret),
            )
            .unwrap();
        assert!(matches!(
            store.load_key_pair(user),
            Err(ChatError::Crypto(luvvix_shared::CryptoError::KeyImport(_)))
        ));
    }
}
