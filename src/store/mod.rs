pub mod cache;
pub mod chunker;
pub mod collections;
pub mod content;
pub mod contexts;
pub mod documents;
pub mod fts;
pub mod path;
pub mod vectors;

use crate::error::{QmdError, Result};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub use cache::Cache;
pub use collections::Collections;
pub use content::Content;
pub use contexts::Contexts;
pub use documents::Documents;
pub use fts::Fts;
pub use vectors::Vectors;

/// Index statistics for the `status` operation.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub content_count: usize,
    pub chunk_count: usize,
    pub pending_embed_count: usize,
    pub vec_dimension: Option<usize>,
    pub collection_stats: HashMap<String, usize>,
}

/// Current timestamp in the format every table stores.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The single embedded database. One connection, single writer; all
/// repositories borrow it and run their statements synchronously.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file, run migrations, and
    /// initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::init_sqlite_vec();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QmdError::State(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(db_path)?;
        Self::init_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(mut conn: Connection) -> Result<Self> {
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        if Self::needs_migration(&conn)? {
            info!("Flat schema detected, migrating to content-addressed layout");
            Self::migrate_flat_schema(&mut conn)?;
        } else {
            Self::init_schema(&conn)?;
        }

        Ok(Self { conn })
    }

    /// Load the sqlite-vec extension globally (idempotent).
    fn init_sqlite_vec() {
        use sqlite_vec::sqlite3_vec_init;
        use std::os::raw::c_void;

        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const c_void,
            )));
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // Repository accessors. Each repository is a narrow data-access unit
    // borrowing this connection: pure persistence, no policy.

    pub fn content(&self) -> Content<'_> {
        Content::new(&self.conn)
    }

    pub fn collections(&self) -> Collections<'_> {
        Collections::new(&self.conn)
    }

    pub fn documents(&self) -> Documents<'_> {
        Documents::new(&self.conn)
    }

    pub fn contexts(&self) -> Contexts<'_> {
        Contexts::new(&self.conn)
    }

    pub fn vectors(&self) -> Vectors<'_> {
        Vectors::new(&self.conn)
    }

    pub fn fts(&self) -> Fts<'_> {
        Fts::new(&self.conn)
    }

    pub fn cache(&self) -> Cache<'_> {
        Cache::new(&self.conn)
    }

    /// Close the connection cleanly, letting WAL checkpoint.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| QmdError::Db(e))
    }

    fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Initialize database schema: tables, FTS mirror triggers, indexes.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Content-addressable storage: one body per distinct SHA-256
            CREATE TABLE IF NOT EXISTS content (
                hash TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                pwd TEXT NOT NULL,
                glob_pattern TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (pwd, glob_pattern)
            );

            -- No FK on hash: inactive documents may outlive their content
            -- row until collection removal deletes them.
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                title TEXT NOT NULL,
                hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                modified_at TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                UNIQUE (collection_id, path)
            );

            CREATE TABLE IF NOT EXISTS path_contexts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
                path_prefix TEXT NOT NULL,
                context TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (collection_id, path_prefix)
            );

            CREATE TABLE IF NOT EXISTS content_vectors (
                hash TEXT NOT NULL,
                seq INTEGER NOT NULL DEFAULT 0,
                pos INTEGER NOT NULL DEFAULT 0,
                model TEXT NOT NULL,
                embedded_at TEXT NOT NULL,
                PRIMARY KEY (hash, seq)
            );

            -- LLM response cache keyed by SHA-256(url || canonical body)
            CREATE TABLE IF NOT EXISTS ollama_cache (
                hash TEXT PRIMARY KEY,
                result TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                path, body,
                tokenize='porter unicode61'
            );
        "#,
        )?;

        // documents_fts mirrors (path, body) of every documents row; the
        // body is joined in from content at trigger time, so content rows
        // must exist before the document that references them.
        conn.execute_batch(
            r#"
            CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
                INSERT INTO documents_fts(rowid, path, body)
                VALUES (new.id, new.path, (SELECT doc FROM content WHERE hash = new.hash));
            END;

            CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
                DELETE FROM documents_fts WHERE rowid = old.id;
            END;

            CREATE TRIGGER IF NOT EXISTS documents_au AFTER UPDATE ON documents BEGIN
                DELETE FROM documents_fts WHERE rowid = old.id;
                INSERT INTO documents_fts(rowid, path, body)
                VALUES (new.id, new.path, (SELECT doc FROM content WHERE hash = new.hash));
            END;
        "#,
        )?;

        conn.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_documents_collection_active
                ON documents(collection_id, active);
            CREATE INDEX IF NOT EXISTS idx_documents_hash ON documents(hash);
            CREATE INDEX IF NOT EXISTS idx_documents_path_active ON documents(path, active);
            CREATE INDEX IF NOT EXISTS idx_path_contexts_prefix
                ON path_contexts(collection_id, path_prefix);
        "#,
        )?;

        Ok(())
    }

    /// A database from before content-addressing carried the body inline
    /// on `documents` and had no `content` table.
    fn needs_migration(conn: &Connection) -> Result<bool> {
        Ok(Self::table_exists(conn, "documents")? && !Self::table_exists(conn, "content")?)
    }

    /// Migrate the flat schema in one atomic unit of work: rename old
    /// tables, create the new schema, fold bodies into `content` by hash,
    /// derive collection-relative paths, regenerate collection names, and
    /// let the triggers repopulate the FTS mirror. Any failure reverts.
    fn migrate_flat_schema(conn: &mut Connection) -> Result<()> {
        if !Self::table_exists(conn, "collections")? {
            return Err(QmdError::State(
                "flat schema has no collections table to migrate".to_string(),
            ));
        }

        let tx = conn.transaction()?;

        tx.execute_batch(
            "ALTER TABLE documents RENAME TO documents_old;
             ALTER TABLE collections RENAME TO collections_old;
             DROP TABLE IF EXISTS documents_fts;",
        )?;

        Self::init_schema(&tx)?;

        // Regenerate collection names from pwd basenames; collisions get
        // the old rowid appended.
        let old_collections: Vec<(i64, String, Option<String>)> = {
            let mut stmt =
                tx.prepare("SELECT rowid, path, pattern FROM collections_old ORDER BY rowid")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let ts = now();
        let mut taken: HashSet<String> = HashSet::new();
        for (rowid, pwd, pattern) in &old_collections {
            let glob = pattern.clone().unwrap_or_else(|| "**/*.md".to_string());
            let base = Path::new(pwd)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "collection".to_string());
            let name = if taken.contains(&base) {
                format!("{base}-{rowid}")
            } else {
                base
            };
            taken.insert(name.clone());
            tx.execute(
                "INSERT INTO collections (name, pwd, glob_pattern, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                rusqlite::params![name, pwd, glob, ts, ts],
            )?;
        }

        // Fold duplicate bodies into content by hash, earliest wins.
        tx.execute(
            "INSERT OR IGNORE INTO content (hash, doc, created_at)
             SELECT hash, doc, MIN(created_at) FROM documents_old GROUP BY hash",
            [],
        )?;

        // Re-home documents under the new collection ids with paths made
        // relative to the collection pwd. The insert trigger repopulates
        // documents_fts as a side effect.
        tx.execute(
            "INSERT INTO documents
                (collection_id, path, title, hash, created_at, modified_at, active)
             SELECT c.id,
                    CASE WHEN d.path LIKE co.path || '/%'
                         THEN substr(d.path, length(co.path) + 2)
                         ELSE d.path END,
                    d.title, d.hash, d.created_at, d.modified_at, d.active
             FROM documents_old d
             JOIN collections_old co ON co.name = d.collection
             JOIN collections c ON c.pwd = co.path",
            [],
        )?;

        tx.execute_batch(
            "DROP TABLE documents_old;
             DROP TABLE collections_old;",
        )?;

        tx.commit()?;
        info!("Migration complete");
        Ok(())
    }

    /// Aggregate index statistics.
    pub fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();

        stats.collection_count = self.conn.query_row(
            "SELECT COUNT(*) FROM collections",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.document_count = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE active = 1",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.content_count = self.conn.query_row(
            "SELECT COUNT(*) FROM content",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.chunk_count = self.conn.query_row(
            "SELECT COUNT(*) FROM content_vectors",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.pending_embed_count = self.conn.query_row(
            "SELECT COUNT(DISTINCT d.hash) FROM documents d
             WHERE d.active = 1
               AND NOT EXISTS (SELECT 1 FROM content_vectors cv
                               WHERE cv.hash = d.hash AND cv.seq = 0)",
            [],
            |row| row.get::<_, i64>(0),
        )? as usize;
        stats.vec_dimension = self.vectors().dimension()?;

        let mut stmt = self.conn.prepare(
            "SELECT c.name, COUNT(d.id) FROM collections c
             LEFT JOIN documents d ON d.collection_id = c.id AND d.active = 1
             GROUP BY c.id ORDER BY c.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (name, count) = row?;
            stats.collection_stats.insert(name, count as usize);
        }

        Ok(stats)
    }

    /// Verify the vec extension actually loaded; logs and returns false
    /// if KNN queries would fail.
    pub fn vec_available(&self) -> bool {
        match self
            .conn
            .query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        {
            Ok(_) => true,
            Err(e) => {
                warn!("sqlite-vec not available: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_tables_exist() {
        let store = Store::open_in_memory().unwrap();
        for table in [
            "content",
            "collections",
            "documents",
            "path_contexts",
            "content_vectors",
            "ollama_cache",
            "documents_fts",
        ] {
            assert!(
                Store::table_exists(store.conn(), table).unwrap(),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn test_fts_trigger_mirrors_documents() {
        let store = Store::open_in_memory().unwrap();
        let ts = now();
        store
            .conn()
            .execute(
                "INSERT INTO collections (name, pwd, glob_pattern, created_at, updated_at)
                 VALUES ('notes', '/notes', '**/*.md', ?1, ?1)",
                [&ts],
            )
            .unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO content (hash, doc, created_at) VALUES ('h1', 'the quick brown fox', ?)",
                [&ts],
            )
            .unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO documents (collection_id, path, title, hash, created_at, modified_at)
                 VALUES (1, 'a.md', 'A', 'h1', ?1, ?1)",
                [&ts],
            )
            .unwrap();

        let count: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH 'quick'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Update rewrites the mirror row
        store
            .conn()
            .execute(
                "INSERT INTO content (hash, doc, created_at) VALUES ('h2', 'slow red turtle', ?)",
                [&ts],
            )
            .unwrap();
        store
            .conn()
            .execute("UPDATE documents SET hash = 'h2' WHERE id = 1", [])
            .unwrap();
        let count: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM documents_fts WHERE documents_fts MATCH 'turtle'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Delete removes it
        store.conn().execute("DELETE FROM documents WHERE id = 1", []).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM documents_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_migration_from_flat_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("index.db");

        // Build the old flat schema by hand
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                r#"
                CREATE TABLE collections (
                    name TEXT PRIMARY KEY,
                    path TEXT NOT NULL,
                    pattern TEXT,
                    description TEXT
                );
                CREATE TABLE documents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    collection TEXT NOT NULL,
                    path TEXT NOT NULL,
                    title TEXT NOT NULL,
                    hash TEXT NOT NULL,
                    doc TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    modified_at TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1
                );
            "#,
            )
            .unwrap();
            conn.execute(
                "INSERT INTO collections (name, path, pattern) VALUES ('old', '/repo/docs', '**/*.md')",
                [],
            )
            .unwrap();
            // Two documents sharing one body
            conn.execute(
                "INSERT INTO documents (collection, path, title, hash, doc, created_at, modified_at)
                 VALUES ('old', '/repo/docs/a.md', 'A', 'hh', 'same body', '2024-01-01', '2024-01-01')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO documents (collection, path, title, hash, doc, created_at, modified_at)
                 VALUES ('old', '/repo/docs/b.md', 'B', 'hh', 'same body', '2024-02-01', '2024-02-01')",
                [],
            )
            .unwrap();
        }

        let store = Store::open(&db_path).unwrap();

        // Bodies folded by hash, earliest created_at wins
        let (count, created): (i64, String) = store
            .conn()
            .query_row(
                "SELECT COUNT(*), MIN(created_at) FROM content",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(created, "2024-01-01");

        // Collection renamed from pwd basename, paths made relative
        let name: String = store
            .conn()
            .query_row("SELECT name FROM collections", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "docs");
        let paths: Vec<String> = {
            let mut stmt = store
                .conn()
                .prepare("SELECT path FROM documents ORDER BY path")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };
        assert_eq!(paths, vec!["a.md", "b.md"]);

        // FTS mirror repopulated by the insert triggers
        let fts: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM documents_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts, 2);

        // Old tables are gone
        assert!(!Store::table_exists(store.conn(), "documents_old").unwrap());
    }

    #[test]
    fn test_stats_empty() {
        let store = Store::open_in_memory().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.collection_count, 0);
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
    }
}
