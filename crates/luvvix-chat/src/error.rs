use thiserror::Error;

use luvvix_shared::{ConversationId, CryptoError, UserId};
use luvvix_store::StoreError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("User {0} has not set up secure messaging yet")]
    DirectoryLookup(UserId),

    #[error("Missing key material for user {0}")]
    MissingKeyMaterial(UserId),

    #[error("No participant of conversation {0} has usable key material")]
    NoRecipientKey(ConversationId),

    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        if e.is_transient() {
            ChatError::TransientStore(e.to_string())
        } else {
            ChatError::Store(e)
        }
    }
}

/// Map a store `NotFound` onto [`ChatError::NotFound`] naming `what`.
pub(crate) fn not_found(what: impl Into<String>) -> impl FnOnce(StoreError) -> ChatError {
    let what = what.into();
    move |e| match e {
        StoreError::NotFound => ChatError::NotFound(what),
        other => other.into(),
    }
}

impl ChatError {
    /// Only store hiccups are worth resubmitting unchanged. Crypto failures
    /// give the same answer every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::TransientStore(_))
    }

    /// The other party (or this device) still has to set up keys.
    pub fn is_missing_keys(&self) -> bool {
        matches!(
            self,
            ChatError::DirectoryLookup(_)
                | ChatError::MissingKeyMaterial(_)
                | ChatError::NoRecipientKey(_)
        )
    }

    /// Wording suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::DirectoryLookup(_) | ChatError::MissingKeyMaterial(_) => {
                "This contact hasn't enabled secure messaging yet.".to_string()
            }
            ChatError::NoRecipientKey(_) => {
                "Nobody in this conversation can receive encrypted messages yet.".to_string()
            }
            ChatError::TransientStore(_) => {
                "Connection problem. Please try again.".to_string()
            }
            ChatError::Crypto(CryptoError::PayloadTooLarge { max, .. }) => {
                format!("Message is too long (limit {max} bytes).")
            }
            ChatError::Crypto(CryptoError::KeyGeneration | CryptoError::KeyImport(_)) => {
                "Your encryption keys could not be set up on this device.".to_string()
            }
            ChatError::Crypto(_) => "This message could not be encrypted.".to_string(),
            ChatError::Forbidden(_) => "You are not allowed to do that.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
