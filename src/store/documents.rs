use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

/// A document row. The body lives in `content`, referenced by `hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRow {
    pub id: i64,
    pub collection_id: i64,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub created_at: String,
    pub modified_at: String,
    pub active: bool,
}

/// A document joined with its collection, for external addressing.
#[derive(Debug, Clone)]
pub struct AddressedDocument {
    pub doc: DocumentRow,
    pub collection_name: String,
    pub collection_pwd: String,
}

impl AddressedDocument {
    /// Absolute filesystem path of the document.
    pub fn absolute_path(&self) -> String {
        format!("{}/{}", self.collection_pwd, self.doc.path)
    }

    pub fn virtual_path(&self) -> String {
        super::path::build_virtual_path(&self.collection_name, &self.doc.path)
    }
}

pub struct Documents<'a> {
    conn: &'a Connection,
}

impl<'a> Documents<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    const COLS: &'static str =
        "id, collection_id, path, title, hash, created_at, modified_at, active";

    fn row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
        Ok(DocumentRow {
            id: row.get(0)?,
            collection_id: row.get(1)?,
            path: row.get(2)?,
            title: row.get(3)?,
            hash: row.get(4)?,
            created_at: row.get(5)?,
            modified_at: row.get(6)?,
            active: row.get::<_, i64>(7)? != 0,
        })
    }

    /// Insert a new active document. The content row for `hash` must
    /// already exist so the FTS trigger can mirror the body.
    pub fn create(
        &self,
        collection_id: i64,
        path: &str,
        title: &str,
        hash: &str,
        modified_at: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO documents
                (collection_id, path, title, hash, created_at, modified_at, active)
             VALUES (?, ?, ?, ?, ?, ?, 1)",
            rusqlite::params![collection_id, path, title, hash, super::now(), modified_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_by_path(&self, collection_id: i64, path: &str) -> Result<Option<DocumentRow>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM documents WHERE collection_id = ? AND path = ?",
                    Self::COLS
                ),
                rusqlite::params![collection_id, path],
                Self::row,
            )
            .optional()?;
        Ok(row)
    }

    /// Point a document at new content, refreshing its title.
    pub fn update_content(&self, id: i64, hash: &str, title: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET hash = ?, title = ?, modified_at = ?, active = 1 WHERE id = ?",
            rusqlite::params![hash, title, super::now(), id],
        )?;
        Ok(())
    }

    pub fn update_title(&self, id: i64, title: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET title = ?, modified_at = ?, active = 1 WHERE id = ?",
            rusqlite::params![title, super::now(), id],
        )?;
        Ok(())
    }

    pub fn set_active(&self, id: i64, active: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE documents SET active = ? WHERE id = ?",
            rusqlite::params![active as i64, id],
        )?;
        Ok(())
    }

    /// Soft-delete every document in the collection whose path is not in
    /// `seen`. Returns how many were deactivated.
    pub fn deactivate_missing(&self, collection_id: i64, seen: &HashSet<String>) -> Result<usize> {
        let active: Vec<(i64, String)> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, path FROM documents WHERE collection_id = ? AND active = 1",
            )?;
            let rows = stmt.query_map([collection_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let mut removed = 0;
        for (id, path) in active {
            if !seen.contains(&path) {
                self.set_active(id, false)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete every content row (and its vectors) whose hash is not
    /// referenced by any active document. Returns the number of content
    /// rows removed.
    pub fn cleanup_orphaned_content(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let orphans: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT hash FROM content
                 WHERE hash NOT IN (SELECT hash FROM documents WHERE active = 1)",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let vec_table: bool = tx.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'vectors_vec'",
            [],
            |row| row.get::<_, i64>(0),
        )? > 0;

        for hash in &orphans {
            if vec_table {
                tx.execute(
                    "DELETE FROM vectors_vec WHERE hash_seq LIKE ?",
                    [format!("{hash}_%")],
                )?;
            }
            tx.execute("DELETE FROM content_vectors WHERE hash = ?", [hash])?;
            tx.execute("DELETE FROM content WHERE hash = ?", [hash])?;
        }

        tx.commit()?;
        Ok(orphans.len())
    }

    /// Resolve a (collection name, relative path) address.
    pub fn get_addressed(
        &self,
        collection_name: &str,
        path: &str,
    ) -> Result<Option<AddressedDocument>> {
        let row = self
            .conn
            .query_row(
                "SELECT d.id, d.collection_id, d.path, d.title, d.hash,
                        d.created_at, d.modified_at, d.active, c.name, c.pwd
                 FROM documents d
                 JOIN collections c ON c.id = d.collection_id
                 WHERE c.name = ? AND d.path = ? AND d.active = 1",
                [collection_name, path],
                |row| {
                    Ok(AddressedDocument {
                        doc: Self::row(row)?,
                        collection_name: row.get(8)?,
                        collection_pwd: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Body of an addressed document, joined from content.
    pub fn get_body(&self, doc: &DocumentRow) -> Result<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT doc FROM content WHERE hash = ?",
                [&doc.hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// All active documents, optionally restricted to one collection and
    /// a path prefix, in path order.
    pub fn list_active(
        &self,
        collection_id: Option<i64>,
        path_prefix: Option<&str>,
    ) -> Result<Vec<AddressedDocument>> {
        let mut sql = String::from(
            "SELECT d.id, d.collection_id, d.path, d.title, d.hash,
                    d.created_at, d.modified_at, d.active, c.name, c.pwd
             FROM documents d
             JOIN collections c ON c.id = d.collection_id
             WHERE d.active = 1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(id) = collection_id {
            sql.push_str(" AND d.collection_id = ?");
            params.push(Box::new(id));
        }
        if let Some(prefix) = path_prefix {
            sql.push_str(" AND (d.path = ? OR d.path LIKE ? ESCAPE '\\')");
            params.push(Box::new(prefix.to_string()));
            params.push(Box::new(format!("{}/%", escape_like(prefix))));
        }
        sql.push_str(" ORDER BY c.name, d.path");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| {
                Ok(AddressedDocument {
                    doc: Self::row(row)?,
                    collection_name: row.get(8)?,
                    collection_pwd: row.get(9)?,
                })
            },
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Active documents referencing a content hash, optionally within
    /// one collection. Deduplicated bodies fan out to every document.
    pub fn active_by_hash(
        &self,
        hash: &str,
        collection_id: Option<i64>,
    ) -> Result<Vec<AddressedDocument>> {
        let mut sql = String::from(
            "SELECT d.id, d.collection_id, d.path, d.title, d.hash,
                    d.created_at, d.modified_at, d.active, c.name, c.pwd
             FROM documents d
             JOIN collections c ON c.id = d.collection_id
             WHERE d.hash = ? AND d.active = 1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(hash.to_string())];
        if let Some(cid) = collection_id {
            sql.push_str(" AND d.collection_id = ?");
            params.push(Box::new(cid));
        }
        sql.push_str(" ORDER BY d.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
            |row| {
                Ok(AddressedDocument {
                    doc: Self::row(row)?,
                    collection_name: row.get(8)?,
                    collection_pwd: row.get(9)?,
                })
            },
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Active documents whose absolute filesystem path contains `needle`
    /// case-insensitively. Used for not-found suggestions.
    pub fn similar_paths(&self, needle: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, d.path FROM documents d
             JOIN collections c ON c.id = d.collection_id
             WHERE d.active = 1
               AND instr(lower(c.pwd || '/' || d.path), lower(?)) > 0
             ORDER BY c.name, d.path
             LIMIT ?",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![needle, limit as i64],
            |row| {
                let name: String = row.get(0)?;
                let path: String = row.get(1)?;
                Ok(super::path::build_virtual_path(&name, &path))
            },
        )?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Short unique display paths for all active documents: at least
    /// `parent_dir/filename`, prepending further ancestors until unique,
    /// with the full filesystem path as the final fallback.
    pub fn display_paths(&self) -> Result<HashMap<i64, String>> {
        let docs = self.list_active(None, None)?;

        // Per-document component list of the absolute path
        let components: Vec<(i64, Vec<String>)> = docs
            .iter()
            .map(|d| {
                let abs = d.absolute_path();
                let parts = abs
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                (d.doc.id, parts)
            })
            .collect();

        let suffix = |parts: &[String], depth: usize| -> String {
            let start = parts.len().saturating_sub(depth);
            parts[start..].join("/")
        };

        let mut depth: HashMap<i64, usize> = components
            .iter()
            .map(|(id, parts)| (*id, 2.min(parts.len())))
            .collect();

        loop {
            let mut groups: HashMap<String, Vec<i64>> = HashMap::new();
            for (id, parts) in &components {
                groups
                    .entry(suffix(parts, depth[id]))
                    .or_default()
                    .push(*id);
            }
            let mut grew = false;
            for ids in groups.values() {
                if ids.len() < 2 {
                    continue;
                }
                for (id, parts) in components.iter().filter(|(id, _)| ids.contains(id)) {
                    if depth[id] < parts.len() {
                        *depth.get_mut(id).expect("depth seeded for all docs") += 1;
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        Ok(components
            .into_iter()
            .map(|(id, parts)| {
                let d = depth[&id];
                let display = if d >= parts.len() {
                    format!("/{}", parts.join("/"))
                } else {
                    suffix(&parts, d)
                };
                (id, display)
            })
            .collect())
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::content::hash_content;
    use crate::store::Store;

    fn seed(store: &Store, pwd: &str) -> i64 {
        store
            .collections()
            .get_or_create(pwd, "**/*.md")
            .unwrap()
            .id
    }

    fn add_doc(store: &Store, collection_id: i64, path: &str, body: &str) -> i64 {
        let hash = hash_content(body);
        store.content().insert(&hash, body).unwrap();
        store
            .documents()
            .create(collection_id, path, "T", &hash, "2024-01-01")
            .unwrap()
    }

    #[test]
    fn test_create_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        add_doc(&store, cid, "notes.md", "hello");

        let doc = store
            .documents()
            .get_by_path(cid, "notes.md")
            .unwrap()
            .unwrap();
        assert!(doc.active);
        assert_eq!(doc.title, "T");
        assert_eq!(
            store.documents().get_body(&doc).unwrap().as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_cleanup_orphaned_content() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        let id = add_doc(&store, cid, "x.md", "body");

        // Active reference: nothing to clean
        assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 0);

        store.documents().set_active(id, false).unwrap();
        assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 1);

        // Idempotent: second run reports zero
        assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 0);
    }

    #[test]
    fn test_content_dedup_across_documents() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        add_doc(&store, cid, "a.md", "identical");
        add_doc(&store, cid, "b.md", "identical");

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 0);
    }

    #[test]
    fn test_deactivate_missing() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        add_doc(&store, cid, "keep.md", "one");
        add_doc(&store, cid, "drop.md", "two");

        let seen: HashSet<String> = ["keep.md".to_string()].into_iter().collect();
        let removed = store.documents().deactivate_missing(cid, &seen).unwrap();
        assert_eq!(removed, 1);

        let doc = store.documents().get_by_path(cid, "drop.md").unwrap().unwrap();
        assert!(!doc.active);
    }

    #[test]
    fn test_display_paths_disambiguate() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        add_doc(&store, cid, "api/readme.md", "a");
        add_doc(&store, cid, "cli/readme.md", "b");
        add_doc(&store, cid, "unique.md", "c");

        let displays = store.documents().display_paths().unwrap();
        let values: Vec<&str> = displays.values().map(|s| s.as_str()).collect();
        assert!(values.contains(&"api/readme.md"));
        assert!(values.contains(&"cli/readme.md"));
        // All unique
        let unique: HashSet<&&str> = values.iter().collect();
        assert_eq!(unique.len(), values.len());
    }

    #[test]
    fn test_similar_paths() {
        let store = Store::open_in_memory().unwrap();
        let cid = seed(&store, "/repo");
        add_doc(&store, cid, "docs/Setup-Guide.md", "a");
        add_doc(&store, cid, "docs/other.md", "b");

        let similar = store.documents().similar_paths("setup", 5).unwrap();
        assert_eq!(similar, vec!["qmd://repo/docs/Setup-Guide.md"]);
    }
}
