//! Content codecs.
//!
//! A codec turns plaintext (message bodies, conversation names) into the
//! payload persisted in the store plus any per-recipient key wraps, and back.
//! Plaintext and encrypted chats share every other code path; only the codec
//! differs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MESSAGE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::crypto;
use crate::error::CryptoError;
use crate::keys::{self, PublicKey, SecretKey};
use crate::types::UserId;

/// A participant able to receive encoded content, with the key snapshot the
/// content is addressed to.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user_id: UserId,
    pub key_version: u32,
    pub public_key: PublicKey,
}

/// The content key of one item, sealed to one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyWrap {
    pub recipient_id: UserId,
    pub key_version: u32,
    /// base64 sealed box holding the 32-byte content key.
    pub wrapped_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodedContent {
    pub body: String,
    pub wraps: Vec<KeyWrap>,
}

pub trait ContentCodec: Send + Sync {
    /// Whether encoding needs recipient public keys at all.
    fn requires_keys(&self) -> bool;

    fn encode(&self, plaintext: &str, recipients: &[Recipient]) -> Result<EncodedContent, CryptoError>;

    /// `wrap` is the local user's key wrap for the item, if one exists.
    fn decode(&self, body: &str, wrap: Option<&KeyWrap>) -> Result<String, CryptoError>;
}

/// Identity codec for unencrypted conversations.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl ContentCodec for PlainCodec {
    fn requires_keys(&self) -> bool {
        false
    }

    fn encode(&self, plaintext: &str, _recipients: &[Recipient]) -> Result<EncodedContent, CryptoError> {
        check_size(plaintext)?;
        Ok(EncodedContent {
            body: plaintext.to_string(),
            wraps: Vec::new(),
        })
    }

    fn decode(&self, body: &str, _wrap: Option<&KeyWrap>) -> Result<String, CryptoError> {
        Ok(body.to_string())
    }
}

/// Hybrid encryption: one random content key per item encrypts the body with
/// XChaCha20-Poly1305, and that key is sealed separately to every recipient.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    secret: SecretKey,
}

impl EnvelopeCodec {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }
}

impl ContentCodec for EnvelopeCodec {
    fn requires_keys(&self) -> bool {
        true
    }

    fn encode(&self, plaintext: &str, recipients: &[Recipient]) -> Result<EncodedContent, CryptoError> {
        check_size(plaintext)?;
        if recipients.is_empty() {
            return Err(CryptoError::Encryption);
        }

        let content_key = crypto::generate_symmetric_key().map_err(|_| CryptoError::Encryption)?;
        let body = crypto::encrypt(&content_key, plaintext.as_bytes())?;

        let wraps = recipients
            .iter()
            .map(|r| {
                keys::seal(&content_key, &r.public_key).map(|sealed| KeyWrap {
                    recipient_id: r.user_id,
                    key_version: r.key_version,
                    wrapped_key: BASE64.encode(sealed),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EncodedContent {
            body: BASE64.encode(body),
            wraps,
        })
    }

    fn decode(&self, body: &str, wrap: Option<&KeyWrap>) -> Result<String, CryptoError> {
        let wrap = wrap.ok_or(CryptoError::Decryption)?;

        let sealed = BASE64
            .decode(&wrap.wrapped_key)
            .map_err(|_| CryptoError::Decryption)?;
        let key_bytes = keys::open(&sealed, &self.secret)?;
        let content_key: [u8; SYMMETRIC_KEY_SIZE] =
            key_bytes.try_into().map_err(|_| CryptoError::Decryption)?;

        let ciphertext = BASE64.decode(body).map_err(|_| CryptoError::Decryption)?;
        let plaintext = crypto::decrypt(&content_key, &ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
    }
}

fn check_size(plaintext: &str) -> Result<(), CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}
