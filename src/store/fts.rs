use crate::error::Result;
use rusqlite::Connection;

/// An FTS5 match joined back to its document and collection.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub document_id: i64,
    pub collection_name: String,
    pub collection_pwd: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    /// Raw BM25 score; smaller (more negative) is more relevant.
    pub bm25: f64,
}

/// BM25 column weights: a path match is worth ten body matches.
const WEIGHT_PATH: f64 = 10.0;
const WEIGHT_BODY: f64 = 1.0;

pub struct Fts<'a> {
    conn: &'a Connection,
}

impl<'a> Fts<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run a prepared FTS5 match expression, ordered by ascending raw
    /// BM25 (most relevant first). Inactive documents are filtered out;
    /// an optional collection restricts the scope.
    pub fn search(
        &self,
        match_expr: &str,
        limit: usize,
        collection_id: Option<i64>,
    ) -> Result<Vec<FtsHit>> {
        let base = format!(
            "SELECT d.id, c.name, c.pwd, d.path, d.title, d.hash,
                    bm25(documents_fts, {WEIGHT_PATH}, {WEIGHT_BODY}) AS score
             FROM documents_fts f
             JOIN documents d ON d.id = f.rowid
             JOIN collections c ON c.id = d.collection_id
             WHERE documents_fts MATCH ? AND d.active = 1"
        );

        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<FtsHit> {
            Ok(FtsHit {
                document_id: row.get(0)?,
                collection_name: row.get(1)?,
                collection_pwd: row.get(2)?,
                path: row.get(3)?,
                title: row.get(4)?,
                hash: row.get(5)?,
                bm25: row.get(6)?,
            })
        };

        let hits = if let Some(cid) = collection_id {
            let sql = format!("{base} AND d.collection_id = ? ORDER BY score LIMIT ?");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![match_expr, cid, limit as i64],
                map,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let sql = format!("{base} ORDER BY score LIMIT ?");
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params![match_expr, limit as i64], map)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(hits)
    }
}
