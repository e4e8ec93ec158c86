//! Hybrid retrieval: full-text ranking, vector KNN, reciprocal rank
//! fusion, query expansion, and LLM reranking.

pub mod rerank;
pub mod rrf;

use crate::config::Config;
use crate::error::{QmdError, Result};
use crate::llm::{EmbedOptions, LLMProvider, RerankDoc, RERANK_BATCH_SIZE};
use crate::store::cache::{Cache, DEFAULT_MAX_ENTRIES};
use crate::store::path::build_virtual_path;
use crate::store::Store;
use futures::future::join_all;
use log::{debug, info};
use rerank::{blend, excerpt, RERANK_CANDIDATES, RERANK_EXCERPT_CHARS, RERANK_MISSING_SCORE};
use rrf::{rrf_fuse, FusedHit};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

/// Per-query list size feeding hybrid fusion.
const HYBRID_LIST_LIMIT: usize = 20;

/// How many query variations expansion asks for.
const EXPAND_COUNT: usize = 2;

/// Where a hit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Fts,
    Vec,
    Hybrid,
}

/// One search result. `file` is the `qmd://collection/path` address and
/// the identity documents are fused under.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub file: String,
    pub collection: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub score: f64,
    pub source: HitSource,
    /// Character offset of the best-matching chunk, for vector hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_pos: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: f64,
    pub collection: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: 0.0,
            collection: None,
        }
    }
}

enum CollectionFilter {
    All,
    One(i64),
    /// Named collection does not exist: every search over it is empty
    Missing,
}

/// Build the FTS5 match expression: whitespace tokens, lowercased,
/// stripped to letters/digits/apostrophes, each quoted with a `*` prefix
/// suffix, joined with AND. None when no valid token survives.
pub fn build_match_expr(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split_whitespace()
        .map(|token| {
            token
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
        })
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|t| format!("\"{t}\"*"))
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

/// The search engine is stateless; all state lives in the store and its
/// cache table.
pub struct SearchEngine<'a> {
    store: &'a Store,
    llm: &'a dyn LLMProvider,
    config: &'a Config,
}

impl<'a> SearchEngine<'a> {
    pub fn new(store: &'a Store, llm: &'a dyn LLMProvider, config: &'a Config) -> Self {
        Self { store, llm, config }
    }

    fn resolve_collection(&self, name: &Option<String>) -> Result<CollectionFilter> {
        match name {
            None => Ok(CollectionFilter::All),
            Some(name) => match self.store.collections().get_by_name(name)? {
                Some(c) => Ok(CollectionFilter::One(c.id)),
                None => Ok(CollectionFilter::Missing),
            },
        }
    }

    // ── Full-text ────────────────────────────────────────────────

    /// BM25 search. Scores are |bm25|, ordered most relevant first.
    pub fn search_fts(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let collection_id = match self.resolve_collection(&opts.collection)? {
            CollectionFilter::All => None,
            CollectionFilter::One(id) => Some(id),
            CollectionFilter::Missing => return Ok(Vec::new()),
        };
        let Some(expr) = build_match_expr(query) else {
            return Ok(Vec::new());
        };
        let mut hits = self.fts_hits(&expr, opts.limit, collection_id)?;
        hits.retain(|h| h.score >= opts.min_score);
        Ok(hits)
    }

    fn fts_hits(
        &self,
        match_expr: &str,
        limit: usize,
        collection_id: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        let rows = self.store.fts().search(match_expr, limit, collection_id)?;
        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                file: build_virtual_path(&row.collection_name, &row.path),
                collection: row.collection_name,
                path: row.path,
                title: row.title,
                hash: row.hash,
                score: row.bm25.abs(),
                source: HitSource::Fts,
                chunk_pos: None,
            })
            .collect())
    }

    // ── Vector ───────────────────────────────────────────────────

    /// Semantic KNN search. Missing vec table yields empty; a failed
    /// query embedding is an error (the vector-only caller has nothing
    /// to fall back to).
    pub async fn search_vector(
        &self,
        query: &str,
        model: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let collection_id = match self.resolve_collection(&opts.collection)? {
            CollectionFilter::All => None,
            CollectionFilter::One(id) => Some(id),
            CollectionFilter::Missing => return Ok(Vec::new()),
        };
        if !self.store.vectors().table_exists()? {
            return Ok(Vec::new());
        }

        let embedding = self
            .embed_query(query, model)
            .await
            .ok_or_else(|| QmdError::Llm(format!("query embedding with {model} failed")))?;

        let mut hits = self.vector_hits(&embedding, opts.limit, collection_id)?;
        hits.retain(|h| h.score >= opts.min_score);
        Ok(hits)
    }

    async fn embed_query(&self, query: &str, model: &str) -> Option<Vec<f32>> {
        let opts = EmbedOptions {
            model: model.to_string(),
            is_query: true,
            title: None,
        };
        self.llm.embed(query, &opts).await.map(|r| r.embedding)
    }

    /// KNN over three times the requested limit, grouped to the best
    /// chunk per document, distance mapped to `1 / (1 + d)`.
    fn vector_hits(
        &self,
        embedding: &[f32],
        limit: usize,
        collection_id: Option<i64>,
    ) -> Result<Vec<SearchHit>> {
        let knn = self
            .store
            .vectors()
            .search(embedding, limit * 3, collection_id)?;

        // knn is ascending by distance, so the first sighting of a
        // document is its best chunk.
        let mut seen: HashMap<String, ()> = HashMap::new();
        let mut ranked: Vec<SearchHit> = Vec::new();
        for vh in knn {
            for doc in self
                .store
                .documents()
                .active_by_hash(&vh.hash, collection_id)?
            {
                let file = doc.virtual_path();
                if seen.insert(file.clone(), ()).is_some() {
                    continue;
                }
                ranked.push(SearchHit {
                    file,
                    collection: doc.collection_name,
                    path: doc.doc.path,
                    title: doc.doc.title,
                    hash: vh.hash.clone(),
                    score: 1.0 / (1.0 + vh.distance),
                    source: HitSource::Vec,
                    chunk_pos: Some(vh.pos as usize),
                });
            }
            if ranked.len() >= limit {
                break;
            }
        }
        ranked.truncate(limit);
        Ok(ranked)
    }

    // ── Query expansion ──────────────────────────────────────────

    /// Expand a query into `[query, ...variations]`, deterministically
    /// cached. Provider failure is cheap: the original query alone comes
    /// back and nothing poisons the cache.
    pub async fn expand_query(
        &self,
        query: &str,
        model: &str,
        count: usize,
    ) -> Result<Vec<String>> {
        let key = Cache::generate_key(
            "expandQuery",
            &json!({ "model": model, "query": query }),
        );

        if let Some(cached) = self.store.cache().get(&key)? {
            debug!("expansion cache hit for '{query}'");
            let mut out = vec![query.to_string()];
            out.extend(cached.lines().filter(|l| !l.is_empty()).map(String::from));
            return Ok(out);
        }

        let expansions = self.llm.expand_query(query, model, count).await;
        if expansions.len() > 1 {
            let variations = expansions[1..].join("\n");
            self.store
                .cache()
                .set_with_auto_cleanup(&key, &variations, DEFAULT_MAX_ENTRIES)?;
        }
        Ok(expansions)
    }

    // ── Hybrid ───────────────────────────────────────────────────

    /// The full pipeline: expansion, per-query FTS + vector lists, RRF
    /// fusion, optional rerank, score blending.
    pub async fn search_hybrid(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let collection_id = match self.resolve_collection(&opts.collection)? {
            CollectionFilter::All => None,
            CollectionFilter::One(id) => Some(id),
            CollectionFilter::Missing => return Ok(Vec::new()),
        };

        let queries = self
            .expand_query(query, &self.config.default_query_model, EXPAND_COUNT)
            .await?;
        info!("hybrid: {} quer{} after expansion", queries.len(), if queries.len() == 1 { "y" } else { "ies" });

        // Query embeddings overlap on the network; all store access
        // below stays on this thread. A missing vec table (or embed
        // model) downgrades hybrid to FTS-only.
        let vec_ready = self.store.vectors().table_exists()?;
        let embeddings: Vec<Option<Vec<f32>>> = if vec_ready {
            join_all(
                queries
                    .iter()
                    .map(|q| self.embed_query(q, &self.config.default_embed_model)),
            )
            .await
        } else {
            queries.iter().map(|_| None).collect()
        };

        let mut lists: Vec<(Vec<SearchHit>, f64)> = Vec::new();
        for (i, q) in queries.iter().enumerate() {
            // The original query's lists carry double weight
            let weight = if i == 0 { 2.0 } else { 1.0 };
            if let Some(expr) = build_match_expr(q) {
                let fts = self.fts_hits(&expr, HYBRID_LIST_LIMIT, collection_id)?;
                if !fts.is_empty() {
                    lists.push((fts, weight));
                }
            }
            if let Some(embedding) = &embeddings[i] {
                let vec_hits = self.vector_hits(embedding, HYBRID_LIST_LIMIT, collection_id)?;
                if !vec_hits.is_empty() {
                    lists.push((vec_hits, weight));
                }
            }
        }

        let candidates: Vec<FusedHit> = rrf_fuse(&lists)
            .into_iter()
            .take(RERANK_CANDIDATES)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let rerank_scores = self.rerank_scores(query, &candidates).await?;

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, fused)| {
                let rrf_rank = i + 1;
                let mut hit = fused.hit;
                hit.source = HitSource::Hybrid;
                hit.score = match &rerank_scores {
                    Some(scores) => {
                        let rerank_score =
                            *scores.get(&hit.file).unwrap_or(&RERANK_MISSING_SCORE);
                        blend(rrf_rank, rerank_score)
                    }
                    None => fused.rrf_score,
                };
                hit
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.retain(|h| h.score >= opts.min_score);
        hits.truncate(opts.limit);
        Ok(hits)
    }

    /// Rerank scores keyed by file, or None when the rerank model is
    /// missing and fused scores stand as they are.
    async fn rerank_scores(
        &self,
        query: &str,
        candidates: &[FusedHit],
    ) -> Result<Option<HashMap<String, f64>>> {
        let model = &self.config.default_rerank_model;
        if model.is_empty() || !self.llm.model_exists(model).await.exists {
            debug!("rerank model unavailable, keeping fused scores");
            return Ok(None);
        }

        let mut docs = Vec::with_capacity(candidates.len());
        for fused in candidates {
            let body = self
                .store
                .content()
                .get(&fused.hit.hash)?
                .unwrap_or_default();
            docs.push(RerankDoc {
                file: fused.hit.file.clone(),
                text: excerpt(&body, RERANK_EXCERPT_CHARS).to_string(),
            });
        }

        let response = self
            .llm
            .rerank(query, &docs, model, RERANK_BATCH_SIZE)
            .await;
        Ok(Some(
            response
                .results
                .into_iter()
                .map(|r| (r.file, r.score))
                .collect(),
        ))
    }

    // ── Result enrichment ────────────────────────────────────────

    /// Snippet for a hit: text around its best chunk (or the body
    /// start), `max_chars` characters long. `chunk_pos` is a character
    /// offset, matching the chunker's convention.
    pub fn snippet_for(&self, hit: &SearchHit, max_chars: usize) -> Result<Option<String>> {
        let Some(body) = self.store.content().get(&hit.hash)? else {
            return Ok(None);
        };
        let start_char = hit.chunk_pos.unwrap_or(0);
        let chars: Vec<char> = body.chars().collect();
        let start = start_char.min(chars.len());
        let end = (start + max_chars).min(chars.len());
        let snippet: String = chars[start..end].iter().collect();
        Ok(Some(snippet.trim().to_string()))
    }

    /// Inherited path context for a hit, if any prefix matches.
    pub fn context_for(&self, hit: &SearchHit) -> Result<Option<String>> {
        let Some(collection) = self.store.collections().get_by_name(&hit.collection)? else {
            return Ok(None);
        };
        self.store
            .contexts()
            .context_for_path(collection.id, &hit.path)
    }
}
