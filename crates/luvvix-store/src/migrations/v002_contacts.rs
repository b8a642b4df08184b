use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    owner_id       TEXT NOT NULL,
    contact_id     TEXT NOT NULL,
    encrypted_name TEXT,              -- sealed to the owner's public key
    public_key     TEXT NOT NULL,     -- contact's key snapshot at add time
    key_version    INTEGER NOT NULL,
    added_at       TEXT NOT NULL,

    PRIMARY KEY (owner_id, contact_id)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
