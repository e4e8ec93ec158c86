use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

/// Default cap on cached LLM responses.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// LLM response cache. Keys are SHA-256 over the request URL and the
/// canonical JSON encoding of its body, so identical requests hit
/// regardless of who built them.
pub struct Cache<'a> {
    conn: &'a Connection,
}

impl<'a> Cache<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// SHA-256(url || canonical-JSON(body)). `serde_json` keeps object
    /// keys sorted, so equal bodies hash equally.
    pub fn generate_key(url: &str, body: &serde_json::Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(body.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .conn
            .query_row(
                "SELECT result FROM ollama_cache WHERE hash = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    pub fn set(&self, key: &str, result: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO ollama_cache (hash, result, created_at) VALUES (?, ?, ?)",
            rusqlite::params![key, result, super::now()],
        )?;
        Ok(())
    }

    /// Write an entry, then with 1% probability trim the table down to
    /// the `max` most recently created entries. The sampling keeps the
    /// trim off the hot path.
    pub fn set_with_auto_cleanup(&self, key: &str, result: &str, max: usize) -> Result<()> {
        self.set(key, result)?;
        if rand::random::<f64>() < 0.01 {
            self.trim(max)?;
        }
        Ok(())
    }

    /// Keep only the `max` most recently created entries.
    pub fn trim(&self, max: usize) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM ollama_cache WHERE hash NOT IN (
                SELECT hash FROM ollama_cache ORDER BY created_at DESC, hash LIMIT ?
            )",
            [max as i64],
        )?;
        Ok(deleted)
    }

    /// Drop every entry. Run on reindex so stale expansions don't
    /// outlive the content they were computed against.
    pub fn clear(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM ollama_cache", [])?;
        Ok(deleted)
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM ollama_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;

    #[test]
    fn test_generate_key_is_canonical() {
        // Same logical body, different construction order
        let a = json!({"model": "m", "query": "q"});
        let b = json!({"query": "q", "model": "m"});
        assert_eq!(
            Cache::generate_key("http://x/api", &a),
            Cache::generate_key("http://x/api", &b)
        );
        assert_ne!(
            Cache::generate_key("http://x/api", &a),
            Cache::generate_key("http://y/api", &a)
        );
    }

    #[test]
    fn test_set_get_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let cache = store.cache();
        let key = Cache::generate_key("url", &json!({"q": 1}));

        assert!(cache.get(&key).unwrap().is_none());
        cache.set(&key, "cached value").unwrap();
        assert_eq!(cache.get(&key).unwrap().as_deref(), Some("cached value"));
    }

    #[test]
    fn test_trim_keeps_most_recent() {
        let store = Store::open_in_memory().unwrap();
        let cache = store.cache();

        for i in 0..10 {
            // Distinct created_at per row so recency ordering is stable
            store
                .conn()
                .execute(
                    "INSERT INTO ollama_cache (hash, result, created_at)
                     VALUES (?, 'v', ?)",
                    rusqlite::params![format!("k{i}"), format!("2024-01-{:02}", i + 1)],
                )
                .unwrap();
        }

        let deleted = cache.trim(3).unwrap();
        assert_eq!(deleted, 7);
        assert_eq!(cache.len().unwrap(), 3);
        // The newest survive
        assert!(cache.get("k9").unwrap().is_some());
        assert!(cache.get("k0").unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let store = Store::open_in_memory().unwrap();
        let cache = store.cache();
        cache.set("a", "1").unwrap();
        cache.set("b", "2").unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.is_empty().unwrap());
    }
}
