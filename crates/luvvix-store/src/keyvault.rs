//! Device-local key vault.
//!
//! Holds the exported key pair of each user who signed in on this device. It
//! lives in its own SQLite file, separate from the shared chat tables, and
//! is never synchronised anywhere.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use luvvix_shared::UserId;

use crate::error::Result;
use crate::models::StoredKeys;
use crate::sql::{parse_id, parse_ts, ts};

pub struct KeyVault {
    conn: Connection,
}

impl KeyVault {
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening key vault");
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS device_keys (
                user_id    TEXT PRIMARY KEY NOT NULL,
                public_key TEXT NOT NULL,
                secret_key TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Store the pair for `user_id`, replacing any previous one.
    pub fn save_keys(
        &self,
        user_id: UserId,
        public_key: &str,
        secret_key: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO device_keys (user_id, public_key, secret_key, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id.to_string(), public_key, secret_key, ts(&created_at)],
        )?;
        Ok(())
    }

    pub fn load_keys(&self, user_id: UserId) -> Result<Option<StoredKeys>> {
        let keys = self
            .conn
            .query_row(
                "SELECT user_id, public_key, secret_key, created_at
                 FROM device_keys WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| {
                    let user_id: String = row.get(0)?;
                    let created_at: String = row.get(3)?;
                    Ok(StoredKeys {
                        user_id: parse_id(0, &user_id)?,
                        public_key: row.get(1)?,
                        secret_key: row.get(2)?,
                        created_at: parse_ts(3, &created_at)?,
                    })
                },
            )
            .optional()?;
        Ok(keys)
    }
}
