use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

/// Content-addressed document bodies. One row per distinct SHA-256 hash;
/// any number of documents may reference the same row.
pub struct Content<'a> {
    conn: &'a Connection,
}

/// SHA-256 of a document body, hex-encoded.
pub fn hash_content(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl<'a> Content<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a body under its hash. Idempotent: a duplicate key is a
    /// no-op, which is what makes re-indexing shared bodies cheap.
    pub fn insert(&self, hash: &str, doc: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO content (hash, doc, created_at) VALUES (?, ?, ?)",
            rusqlite::params![hash, doc, super::now()],
        )?;
        Ok(())
    }

    pub fn get(&self, hash: &str) -> Result<Option<String>> {
        let doc = self
            .conn
            .query_row("SELECT doc FROM content WHERE hash = ?", [hash], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(doc)
    }

    pub fn exists(&self, hash: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content WHERE hash = ?",
            [hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
