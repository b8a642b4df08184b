//! CRUD operations for [`Contact`] records.

use rusqlite::params;

use luvvix_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Contact, KeySnapshot};
use crate::sql::{not_found, parse_id, parse_ts, ts};

impl Database {
    /// Insert a contact, replacing the name and key snapshot if the owner
    /// already has this contact.
    pub fn upsert_contact(&self, contact: &Contact) -> Result<()> {
        self.conn().execute(
            "INSERT INTO contacts (owner_id, contact_id, encrypted_name, public_key, key_version, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(owner_id, contact_id) DO UPDATE SET
                encrypted_name = excluded.encrypted_name,
                public_key = excluded.public_key,
                key_version = excluded.key_version",
            params![
                contact.owner_id.to_string(),
                contact.contact_id.to_string(),
                contact.encrypted_name,
                contact.key.public_key,
                contact.key.key_version,
                ts(&contact.added_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, owner_id: UserId, contact_id: UserId) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT owner_id, contact_id, encrypted_name, public_key, key_version, added_at
                 FROM contacts WHERE owner_id = ?1 AND contact_id = ?2",
                params![owner_id.to_string(), contact_id.to_string()],
                row_to_contact,
            )
            .map_err(not_found)
    }

    /// Contacts of `owner_id`, in the order they were added.
    pub fn list_contacts(&self, owner_id: UserId) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT owner_id, contact_id, encrypted_name, public_key, key_version, added_at
             FROM contacts WHERE owner_id = ?1 ORDER BY added_at ASC, contact_id ASC",
        )?;
        let rows = stmt.query_map(params![owner_id.to_string()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    pub fn delete_contact(&self, owner_id: UserId, contact_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM contacts WHERE owner_id = ?1 AND contact_id = ?2",
            params![owner_id.to_string(), contact_id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let owner_id: String = row.get(0)?;
    let contact_id: String = row.get(1)?;
    let added_at: String = row.get(5)?;

    Ok(Contact {
        owner_id: parse_id(0, &owner_id)?,
        contact_id: parse_id(1, &contact_id)?,
        encrypted_name: row.get(2)?,
        key: KeySnapshot {
            public_key: row.get(3)?,
            key_version: row.get(4)?,
        },
        added_at: parse_ts(5, &added_at)?,
    })
}
