//! # luvvix-shared
//!
//! Types and cryptography shared by the LuvviX secure chat crates: identifiers,
//! the injectable clock, X25519 key handling, sealed boxes, symmetric AEAD and
//! the content codecs that turn plaintext into stored payloads.

pub mod clock;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{ContentCodec, EncodedContent, EnvelopeCodec, KeyWrap, PlainCodec, Recipient};
pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey, SecretKey};
pub use types::{ConversationId, MessageId, UserId};
