use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key generation failed: secure randomness unavailable")]
    KeyGeneration,

    #[error("Key import failed: {0}")]
    KeyImport(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    Decryption,
}

impl CryptoError {
    /// Encryption-side failures, as opposed to key setup or decryption.
    pub fn is_encryption(&self) -> bool {
        matches!(self, Self::Encryption | Self::PayloadTooLarge { .. })
    }
}
