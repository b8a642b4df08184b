//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use luvvix_store::Database;

use crate::error::{ChatError, Result};

/// Which content codec sessions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Per-message content key sealed to every participant.
    Envelope,
    /// No encryption.
    Plain,
}

impl FromStr for CodecKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "envelope" | "encrypted" => Ok(Self::Envelope),
            "plain" | "plaintext" => Ok(Self::Plain),
            other => Err(ChatError::Config(format!("unknown codec {other:?}"))),
        }
    }
}

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Shared chat database.
    /// Env: `LUVVIX_STORE_PATH`
    /// Default: `luvvix.db` in the platform data directory.
    pub store_path: Option<PathBuf>,

    /// Device-local key vault.
    /// Env: `LUVVIX_KEYSTORE_PATH`
    /// Default: `device-keys.db` in the platform data directory.
    pub keystore_path: Option<PathBuf>,

    /// Deadline for every store round trip.
    /// Env: `LUVVIX_STORE_TIMEOUT_MS`
    /// Default: 5000 ms
    pub store_timeout: Duration,

    /// How long fetched directory keys are reused.
    /// Env: `LUVVIX_DIRECTORY_CACHE_TTL_SECS`
    /// Default: 300 s
    pub directory_cache_ttl: Duration,

    /// Maximum number of cached directory keys.
    /// Env: `LUVVIX_DIRECTORY_CACHE_CAPACITY`
    /// Default: 256
    pub directory_cache_capacity: usize,

    /// Default number of messages returned by a listing.
    /// Env: `LUVVIX_MESSAGE_PAGE_SIZE`
    /// Default: 50
    pub message_page_size: u32,

    /// Buffered live-feed events before a slow subscriber lags.
    /// Env: `LUVVIX_FEED_CAPACITY`
    /// Default: 1024
    pub feed_capacity: usize,

    /// Env: `LUVVIX_CODEC` (`envelope` or `plain`)
    /// Default: `envelope`
    pub codec: CodecKind,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            keystore_path: None,
            store_timeout: Duration::from_millis(5000),
            directory_cache_ttl: Duration::from_secs(300),
            directory_cache_capacity: 256,
            message_page_size: 50,
            feed_capacity: 1024,
            codec: CodecKind::Envelope,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("LUVVIX_STORE_PATH") {
            config.store_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("LUVVIX_KEYSTORE_PATH") {
            config.keystore_path = Some(PathBuf::from(path));
        }

        if let Some(ms) = parse_var::<u64>("LUVVIX_STORE_TIMEOUT_MS") {
            config.store_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_var::<u64>("LUVVIX_DIRECTORY_CACHE_TTL_SECS") {
            config.directory_cache_ttl = Duration::from_secs(secs);
        }

        if let Some(n) = parse_var::<usize>("LUVVIX_DIRECTORY_CACHE_CAPACITY") {
            config.directory_cache_capacity = n;
        }

        if let Some(n) = parse_var::<u32>("LUVVIX_MESSAGE_PAGE_SIZE") {
            config.message_page_size = n;
        }

        if let Some(n) = parse_var::<usize>("LUVVIX_FEED_CAPACITY") {
            config.feed_capacity = n;
        }

        if let Ok(val) = std::env::var("LUVVIX_CODEC") {
            match val.parse() {
                Ok(codec) => config.codec = codec,
                Err(e) => tracing::warn!(value = %val, error = %e, "Invalid LUVVIX_CODEC, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Database::default_path("luvvix.db")?),
        }
    }

    pub fn resolved_keystore_path(&self) -> Result<PathBuf> {
        match &self.keystore_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Database::default_path("device-keys.db")?),
        }
    }
}

/// Read and parse `name`, warning about (and ignoring) unparsable values.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.message_page_size, 50);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.codec, CodecKind::Envelope);
    }

    #[test]
    fn test_codec_parsing() {
        assert_eq!("Envelope".parse::<CodecKind>().unwrap(), CodecKind::Envelope);
        assert_eq!(" plain ".parse::<CodecKind>().unwrap(), CodecKind::Plain);
        assert!("rot13".parse::<CodecKind>().is_err());
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = ChatConfig {
            store_path: Some(PathBuf::from("/tmp/chat.db")),
            keystore_path: Some(PathBuf::from("/tmp/keys.db")),
            ..ChatConfig::default()
        };
        assert_eq!(config.resolved_store_path().unwrap(), PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.resolved_keystore_path().unwrap(), PathBuf::from("/tmp/keys.db"));
    }
}
