use crate::error::{QmdError, Result};
use log::{info, warn};
use rusqlite::{Connection, OptionalExtension};

/// A KNN match joined back to its chunk metadata.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub hash: String,
    pub seq: i64,
    pub pos: i64,
    pub model: String,
    pub distance: f64,
}

/// The vec0 virtual table plus the `content_vectors` metadata paired 1:1
/// with it by `hash_seq = "{hash}_{seq}"`.
pub struct Vectors<'a> {
    conn: &'a Connection,
}

impl<'a> Vectors<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn table_sql(&self) -> Result<Option<String>> {
        let sql = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'vectors_vec'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(sql)
    }

    pub fn table_exists(&self) -> Result<bool> {
        Ok(self.table_sql()?.is_some())
    }

    /// Dimension the vec table was created with, parsed from its DDL.
    pub fn dimension(&self) -> Result<Option<usize>> {
        let Some(sql) = self.table_sql()? else {
            return Ok(None);
        };
        let dim = sql
            .split("float[")
            .nth(1)
            .and_then(|rest| rest.split(']').next())
            .and_then(|d| d.trim().parse::<usize>().ok());
        Ok(dim)
    }

    /// Create the KNN table sized to `dim` on first use. An existing
    /// table with a different dimension is dropped and recreated; callers
    /// must re-embed after that.
    pub fn ensure_vec_table(&self, dim: usize) -> Result<()> {
        match self.dimension()? {
            Some(existing) if existing == dim => return Ok(()),
            Some(existing) => {
                warn!(
                    "vec table dimension changed ({existing} -> {dim}), dropping for re-embed"
                );
                self.conn.execute_batch("DROP TABLE vectors_vec")?;
                self.conn.execute("DELETE FROM content_vectors", [])?;
            }
            None => {}
        }

        info!("Creating vectors_vec with dimension {dim}");
        self.conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE vectors_vec USING vec0(
                hash_seq TEXT PRIMARY KEY,
                embedding float[{dim}]
            )"
        ))?;
        Ok(())
    }

    /// Drop the vec table and truncate chunk metadata (force re-embed).
    pub fn purge(&self) -> Result<()> {
        if self.table_exists()? {
            self.conn.execute_batch("DROP TABLE vectors_vec")?;
        }
        self.conn.execute("DELETE FROM content_vectors", [])?;
        Ok(())
    }

    /// Persist one chunk embedding: metadata row plus the paired KNN row.
    pub fn insert(
        &self,
        hash: &str,
        seq: usize,
        pos: usize,
        model: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let expected = self.dimension()?.ok_or_else(|| {
            QmdError::State("vec table missing; call ensure_vec_table first".to_string())
        })?;
        if embedding.len() != expected {
            return Err(QmdError::State(format!(
                "embedding dimension {} does not match vec table {}",
                embedding.len(),
                expected
            )));
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO content_vectors (hash, seq, pos, model, embedded_at)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![hash, seq as i64, pos as i64, model, super::now()],
        )?;
        let hash_seq = format!("{hash}_{seq}");
        let embedding_json = serde_json::to_string(embedding)
            .map_err(|e| QmdError::State(format!("embedding serialization: {e}")))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO vectors_vec (hash_seq, embedding) VALUES (?, ?)",
            rusqlite::params![hash_seq, embedding_json],
        )?;
        Ok(())
    }

    /// Hashes of content with at least one active document but no vector
    /// for `model` at seq 0, each with body and a representative
    /// path/title from one of its active documents.
    pub fn pending_targets(&self, model: &str) -> Result<Vec<(String, String, String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.hash, c.doc, MIN(d.path), MIN(d.title)
             FROM content c
             JOIN documents d ON d.hash = c.hash AND d.active = 1
             LEFT JOIN content_vectors cv
                 ON cv.hash = c.hash AND cv.seq = 0 AND cv.model = ?
             WHERE cv.hash IS NULL
             GROUP BY c.hash
             ORDER BY c.hash",
        )?;
        let rows = stmt.query_map([model], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// KNN search joined to chunk metadata, optionally restricted to
    /// hashes of active documents in one collection. Returns ascending
    /// distance.
    pub fn search(
        &self,
        embedding: &[f32],
        k: usize,
        collection_id: Option<i64>,
    ) -> Result<Vec<VectorHit>> {
        if !self.table_exists()? {
            return Ok(Vec::new());
        }

        let embedding_json = serde_json::to_string(embedding)
            .map_err(|e| QmdError::State(format!("embedding serialization: {e}")))?;

        // vec0 KNN via `embedding MATCH ? AND k = ?`, then join metadata.
        let results = if let Some(cid) = collection_id {
            let mut stmt = self.conn.prepare(
                "SELECT cv.hash, cv.seq, cv.pos, cv.model, knn.distance
                 FROM (SELECT hash_seq, distance FROM vectors_vec
                       WHERE embedding MATCH ? AND k = ?) knn
                 JOIN content_vectors cv ON cv.hash || '_' || cv.seq = knn.hash_seq
                 WHERE cv.hash IN (SELECT hash FROM documents
                                   WHERE collection_id = ? AND active = 1)
                 ORDER BY knn.distance",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![embedding_json, k as i64, cid],
                |row| {
                    Ok(VectorHit {
                        hash: row.get(0)?,
                        seq: row.get(1)?,
                        pos: row.get(2)?,
                        model: row.get(3)?,
                        distance: row.get(4)?,
                    })
                },
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(
                "SELECT cv.hash, cv.seq, cv.pos, cv.model, knn.distance
                 FROM (SELECT hash_seq, distance FROM vectors_vec
                       WHERE embedding MATCH ? AND k = ?) knn
                 JOIN content_vectors cv ON cv.hash || '_' || cv.seq = knn.hash_seq
                 ORDER BY knn.distance",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![embedding_json, k as i64],
                |row| {
                    Ok(VectorHit {
                        hash: row.get(0)?,
                        seq: row.get(1)?,
                        pos: row.get(2)?,
                        model: row.get(3)?,
                        distance: row.get(4)?,
                    })
                },
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(results)
    }

    /// Chunk count for one model, for status reporting.
    pub fn count_for_model(&self, model: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM content_vectors WHERE model = ?",
            [model],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
