//! # luvvix-chat
//!
//! End-to-end encrypted messaging services for LuvviX.
//!
//! A [`SecureChat`] session ties together the device [`KeyStore`], the public
//! key [`DirectoryService`], and the [`ConversationStore`], [`MessageStore`]
//! and [`ContactBook`] that read and write the shared store. All content
//! passes through one [`luvvix_shared::ContentCodec`], chosen per session.

pub mod cache;
pub mod config;
pub mod contacts;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod keystore;
pub mod messages;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use config::{ChatConfig, CodecKind};
pub use contacts::{ContactBook, ContactEntry};
pub use conversations::{ConversationStore, ConversationSummary};
pub use directory::DirectoryService;
pub use error::{ChatError, Result};
pub use keystore::KeyStore;
pub use messages::{DecodedMessage, MessageBody, MessageStore, Subscription};
pub use session::SecureChat;
