//! X25519 key pairs and single-recipient sealed boxes.
//!
//! A sealed box is `ephemeral_pub (32) || nonce (24) || ciphertext+tag`. The
//! symmetric key comes from the ephemeral/recipient Diffie-Hellman output run
//! through BLAKE3 in derive-key mode, bound to both public keys. Keys travel as
//! standard base64 of their 32 raw bytes.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use x25519_dalek::StaticSecret;

use crate::constants::{
    KDF_CONTEXT_FINGERPRINT, KDF_CONTEXT_SEALED_BOX, MAX_SEALED_PLAINTEXT, NONCE_SIZE,
    PUBKEY_SIZE, SECRET_KEY_SIZE, TAG_SIZE,
};
use crate::crypto::{self, SymmetricKey};
use crate::error::CryptoError;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", fingerprint(self))
    }
}

/// Private half of a device key pair. Never leaves the device except into
/// the local key vault.
#[derive(Clone)]
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    /// Generate a fresh pair from the OS RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        crypto::fill_random(&mut bytes)?;
        let secret = SecretKey(StaticSecret::from(bytes));
        Ok(Self {
            public: secret.public_key(),
            secret,
        })
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        Self {
            public: secret.public_key(),
            secret,
        }
    }
}

pub fn export_public_key(key: &PublicKey) -> String {
    BASE64.encode(key.as_bytes())
}

pub fn export_secret_key(key: &SecretKey) -> String {
    BASE64.encode(key.0.to_bytes())
}

pub fn import_public_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    decode_key(encoded).map(PublicKey::from_bytes)
}

pub fn import_secret_key(encoded: &str) -> Result<SecretKey, CryptoError> {
    decode_key(encoded).map(|bytes| SecretKey(StaticSecret::from(bytes)))
}

fn decode_key(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::KeyImport(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CryptoError::KeyImport(format!("expected 32 key bytes, got {}", b.len())))
}

/// Seal `plaintext` so only the holder of `recipient`'s secret key can open it.
pub fn seal(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    if plaintext.len() > MAX_SEALED_PLAINTEXT {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            max: MAX_SEALED_PLAINTEXT,
        });
    }

    let mut eph_bytes = [0u8; SECRET_KEY_SIZE];
    crypto::fill_random(&mut eph_bytes).map_err(|_| CryptoError::Encryption)?;
    let ephemeral = StaticSecret::from(eph_bytes);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

    let shared = ephemeral.diffie_hellman(&recipient.0);
    if !shared.was_contributory() {
        return Err(CryptoError::Encryption);
    }
    let key = derive_box_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient.as_bytes());

    let body = crypto::encrypt(&key, plaintext)?;
    let mut output = Vec::with_capacity(PUBKEY_SIZE + body.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&body);
    Ok(output)
}

pub fn open(sealed: &[u8], secret: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < PUBKEY_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }

    let (eph_bytes, body) = sealed.split_at(PUBKEY_SIZE);
    let mut eph = [0u8; PUBKEY_SIZE];
    eph.copy_from_slice(eph_bytes);
    let ephemeral_public = x25519_dalek::PublicKey::from(eph);

    let shared = secret.0.diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::Decryption);
    }
    let key = derive_box_key(
        shared.as_bytes(),
        ephemeral_public.as_bytes(),
        secret.public_key().as_bytes(),
    );

    crypto::decrypt(&key, body)
}

/// Encrypt a short text for one recipient. Output is base64.
pub fn encrypt_message(plaintext: &str, recipient: &PublicKey) -> Result<String, CryptoError> {
    seal(plaintext.as_bytes(), recipient).map(|sealed| BASE64.encode(sealed))
}

/// Inverse of [`encrypt_message`]. Every failure is `CryptoError::Decryption`.
pub fn decrypt_message(ciphertext: &str, secret: &SecretKey) -> Result<String, CryptoError> {
    let sealed = BASE64
        .decode(ciphertext.trim())
        .map_err(|_| CryptoError::Decryption)?;
    let bytes = open(&sealed, secret).map_err(|_| CryptoError::Decryption)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::Decryption)
}

/// Short, human-comparable digest of a public key, e.g. `3fa1 09bc 77d2 e410 5c8a`.
pub fn fingerprint(key: &PublicKey) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_FINGERPRINT);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..10])
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn derive_box_key(shared: &[u8], ephemeral_public: &[u8], recipient_public: &[u8]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_SEALED_BOX);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    let hash = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash.as_bytes()[..32]);
    key
}
