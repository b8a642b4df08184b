/// Application name
pub const APP_NAME: &str = "LuvviX";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// X25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// X25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Largest plaintext accepted by a single-recipient sealed box (4 KiB).
pub const MAX_SEALED_PLAINTEXT: usize = 4096;

/// Maximum message body size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SEALED_BOX: &str = "luvvix-sealed-box-v1";
pub const KDF_CONTEXT_FINGERPRINT: &str = "luvvix-key-fingerprint-v1";

/// Shown in place of content that cannot be decrypted.
pub const PLACEHOLDER_UNREADABLE: &str = "[message could not be decrypted]";

/// Shown in place of soft-deleted messages.
pub const PLACEHOLDER_DELETED: &str = "[message deleted]";

/// Shown in place of conversation or contact names that cannot be decrypted.
pub const PLACEHOLDER_NAME: &str = "[encrypted conversation]";
