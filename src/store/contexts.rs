use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// A context attached to a path prefix inside a collection. The empty
/// prefix is the collection root.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextRow {
    pub id: i64,
    pub collection_id: i64,
    pub path_prefix: String,
    pub context: String,
    pub created_at: String,
}

pub struct Contexts<'a> {
    conn: &'a Connection,
}

impl<'a> Contexts<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextRow> {
        Ok(ContextRow {
            id: row.get(0)?,
            collection_id: row.get(1)?,
            path_prefix: row.get(2)?,
            context: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Upsert a context for a prefix.
    pub fn set(&self, collection_id: i64, path_prefix: &str, context: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO path_contexts (collection_id, path_prefix, context, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (collection_id, path_prefix) DO UPDATE SET
                context = excluded.context",
            rusqlite::params![collection_id, path_prefix, context, super::now()],
        )?;
        Ok(())
    }

    pub fn get(&self, collection_id: i64, path_prefix: &str) -> Result<Option<ContextRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, collection_id, path_prefix, context, created_at
                 FROM path_contexts WHERE collection_id = ? AND path_prefix = ?",
                rusqlite::params![collection_id, path_prefix],
                Self::row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list(&self, collection_id: Option<i64>) -> Result<Vec<ContextRow>> {
        let (sql, params): (&str, Vec<i64>) = match collection_id {
            Some(id) => (
                "SELECT id, collection_id, path_prefix, context, created_at
                 FROM path_contexts WHERE collection_id = ? ORDER BY path_prefix",
                vec![id],
            ),
            None => (
                "SELECT id, collection_id, path_prefix, context, created_at
                 FROM path_contexts ORDER BY collection_id, path_prefix",
                vec![],
            ),
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), Self::row)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn remove(&self, collection_id: i64, path_prefix: &str) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM path_contexts WHERE collection_id = ? AND path_prefix = ?",
            rusqlite::params![collection_id, path_prefix],
        )?;
        Ok(deleted > 0)
    }

    /// Context for a document path: the longest prefix `p` such that
    /// `path == p` or `path` starts with `p + "/"`, falling back to the
    /// empty-string (root) prefix. Ties break toward the lower id.
    pub fn context_for_path(&self, collection_id: i64, path: &str) -> Result<Option<String>> {
        let all = self.list(Some(collection_id))?;

        let mut best: Option<&ContextRow> = None;
        for row in &all {
            let matches = if row.path_prefix.is_empty() {
                true
            } else {
                path == row.path_prefix || path.starts_with(&format!("{}/", row.path_prefix))
            };
            if !matches {
                continue;
            }
            best = match best {
                None => Some(row),
                Some(current) => {
                    if row.path_prefix.len() > current.path_prefix.len()
                        || (row.path_prefix.len() == current.path_prefix.len()
                            && row.id < current.id)
                    {
                        Some(row)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        Ok(best.map(|r| r.context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn collection(store: &Store) -> i64 {
        store
            .collections()
            .get_or_create("/repo", "**/*.md")
            .unwrap()
            .id
    }

    #[test]
    fn test_longest_prefix_wins() {
        let store = Store::open_in_memory().unwrap();
        let cid = collection(&store);
        let contexts = store.contexts();
        contexts.set(cid, "", "root").unwrap();
        contexts.set(cid, "docs", "sub").unwrap();

        assert_eq!(
            contexts.context_for_path(cid, "docs/intro.md").unwrap(),
            Some("sub".to_string())
        );
        assert_eq!(
            contexts.context_for_path(cid, "README.md").unwrap(),
            Some("root".to_string())
        );
    }

    #[test]
    fn test_prefix_requires_segment_boundary() {
        let store = Store::open_in_memory().unwrap();
        let cid = collection(&store);
        store.contexts().set(cid, "docs", "sub").unwrap();

        // "docsx/..." does not inherit the "docs" context
        assert_eq!(
            store
                .contexts()
                .context_for_path(cid, "docsx/intro.md")
                .unwrap(),
            None
        );
        // The prefix itself matches
        assert_eq!(
            store.contexts().context_for_path(cid, "docs").unwrap(),
            Some("sub".to_string())
        );
    }

    #[test]
    fn test_upsert_replaces() {
        let store = Store::open_in_memory().unwrap();
        let cid = collection(&store);
        store.contexts().set(cid, "docs", "first").unwrap();
        store.contexts().set(cid, "docs", "second").unwrap();

        let row = store.contexts().get(cid, "docs").unwrap().unwrap();
        assert_eq!(row.context, "second");
        assert_eq!(store.contexts().list(Some(cid)).unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let store = Store::open_in_memory().unwrap();
        let cid = collection(&store);
        store.contexts().set(cid, "docs", "x").unwrap();
        assert!(store.contexts().remove(cid, "docs").unwrap());
        assert!(!store.contexts().remove(cid, "docs").unwrap());
    }
}
