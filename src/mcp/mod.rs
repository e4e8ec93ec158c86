//! MCP tool server over stdio.
//!
//! Exposes the engine's operations as tools (`search`, `vsearch`,
//! `query`, `get`, `multi_get`, `status`) and every indexed document as
//! a `qmd://{collection}/{path}` resource with `text/markdown` content.
//!
//! The store connection is single-threaded, so the engine lives on a
//! dedicated thread for the whole session; tool handlers talk to it
//! through a request channel and never touch the store directly.

use crate::engine::Engine;
use crate::error::Result as QmdResult;
use crate::search::{SearchHit, SearchOptions};
use crate::store::path::{decode_virtual_path, encode_virtual_path, parse_virtual_path};
use anyhow::Result;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::{RequestContext, RoleServer, ServiceExt};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

const SNIPPET_CHARS: usize = 200;

// ── Parameter types ──────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search query string
    pub query: String,
    /// Maximum number of results (default: 20)
    pub limit: Option<usize>,
    /// Collection name to search in
    pub collection: Option<String>,
    /// Minimum score threshold
    pub min_score: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetParams {
    /// Document address: qmd://collection/path
    pub file: String,
    /// Start line (1-based, default: 1)
    pub from: Option<usize>,
    /// Maximum number of lines (default: whole document)
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MultiGetParams {
    /// Path pattern: qmd://collection/glob or a glob over all collections
    pub pattern: String,
    /// Per-file byte cap; larger files are reported as skipped
    pub max_bytes: Option<usize>,
}

/// Structured hit shape returned next to the human-readable summary.
#[derive(Debug, Serialize)]
struct ResultEntry {
    file: String,
    title: String,
    score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum SearchKind {
    Fts,
    Vector,
    Hybrid,
}

/// Outcome of a document fetch: the body, or similar paths for a miss.
enum DocFetch {
    Found(String),
    Miss(Vec<String>),
}

struct ResourceInfo {
    uri: String,
    title: String,
}

enum EngineRequest {
    Search {
        kind: SearchKind,
        query: String,
        opts: SearchOptions,
        reply: oneshot::Sender<QmdResult<Vec<ResultEntry>>>,
    },
    Get {
        file: String,
        reply: oneshot::Sender<QmdResult<DocFetch>>,
    },
    MultiGet {
        pattern: String,
        max_bytes: Option<usize>,
        reply: oneshot::Sender<QmdResult<String>>,
    },
    Status {
        reply: oneshot::Sender<QmdResult<String>>,
    },
    ListDocs {
        reply: oneshot::Sender<QmdResult<Vec<ResourceInfo>>>,
    },
}

// ── Engine thread ────────────────────────────────────────────────

/// Sender half shared by every tool handler.
#[derive(Clone)]
struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<QmdResult<T>>) -> EngineRequest,
    ) -> Result<T, McpError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| McpError::internal_error("engine thread gone", None))?;
        reply_rx
            .await
            .map_err(|_| McpError::internal_error("engine thread gone", None))?
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }
}

/// Run the engine on its own thread with a current-thread runtime for
/// the LLM futures; requests drain strictly in order.
fn spawn_engine_thread(engine: Engine) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("engine runtime");

        while let Some(request) = rx.blocking_recv() {
            match request {
                EngineRequest::Search {
                    kind,
                    query,
                    opts,
                    reply,
                } => {
                    let result = rt.block_on(run_search(&engine, kind, &query, &opts));
                    let _ = reply.send(result);
                }
                EngineRequest::Get { file, reply } => {
                    let _ = reply.send(fetch_document(&engine, &file));
                }
                EngineRequest::MultiGet {
                    pattern,
                    max_bytes,
                    reply,
                } => {
                    let _ = reply.send(run_multi_get(&engine, &pattern, max_bytes));
                }
                EngineRequest::Status { reply } => {
                    let _ = reply.send(run_status(&engine));
                }
                EngineRequest::ListDocs { reply } => {
                    let _ = reply.send(list_docs(&engine));
                }
            }
        }

        let _ = engine.close();
    });

    EngineHandle { tx }
}

async fn run_search(
    engine: &Engine,
    kind: SearchKind,
    query: &str,
    opts: &SearchOptions,
) -> QmdResult<Vec<ResultEntry>> {
    let search = engine.search();
    let hits = match kind {
        SearchKind::Fts => search.search_fts(query, opts)?,
        SearchKind::Vector => {
            search
                .search_vector(query, &engine.config.default_embed_model, opts)
                .await?
        }
        SearchKind::Hybrid => search.search_hybrid(query, opts).await?,
    };
    enrich_hits(engine, &hits)
}

fn enrich_hits(engine: &Engine, hits: &[SearchHit]) -> QmdResult<Vec<ResultEntry>> {
    let search = engine.search();
    hits.iter()
        .map(|hit| {
            Ok(ResultEntry {
                file: hit.file.clone(),
                title: hit.title.clone(),
                score: hit.score,
                snippet: search.snippet_for(hit, SNIPPET_CHARS)?,
                context: search.context_for(hit)?,
            })
        })
        .collect()
}

/// Resolve a document body; a miss carries up to 5 similar paths.
fn fetch_document(engine: &Engine, file: &str) -> QmdResult<DocFetch> {
    let Some(parsed) = parse_virtual_path(file) else {
        return Ok(DocFetch::Miss(
            engine.store.documents().similar_paths(file, 5)?,
        ));
    };
    match engine
        .store
        .documents()
        .get_addressed(&parsed.collection, &parsed.path)?
    {
        Some(addressed) => Ok(DocFetch::Found(
            engine
                .store
                .documents()
                .get_body(&addressed.doc)?
                .unwrap_or_default(),
        )),
        None => Ok(DocFetch::Miss(
            engine.store.documents().similar_paths(&parsed.path, 5)?,
        )),
    }
}

fn run_multi_get(
    engine: &Engine,
    pattern: &str,
    max_bytes: Option<usize>,
) -> QmdResult<String> {
    use crate::error::QmdError;

    let max_bytes = max_bytes.unwrap_or(engine.config.multi_get_max_bytes);
    let (collection_id, path_pattern) = match parse_virtual_path(pattern) {
        Some(parsed) => {
            let collection = engine
                .store
                .collections()
                .get_by_name(&parsed.collection)?
                .ok_or_else(|| {
                    QmdError::not_found(format!("collection '{}'", parsed.collection))
                })?;
            (Some(collection.id), parsed.path)
        }
        None => (None, pattern.to_string()),
    };
    let glob = glob::Pattern::new(&path_pattern)
        .map_err(|e| QmdError::Validation(format!("invalid pattern '{path_pattern}': {e}")))?;

    let docs = engine.store.documents().list_active(collection_id, None)?;
    let mut out = String::new();
    let mut skipped = Vec::new();
    let mut matched = 0usize;
    for addressed in docs {
        if !glob.matches(&addressed.doc.path) {
            continue;
        }
        matched += 1;
        let body = engine
            .store
            .documents()
            .get_body(&addressed.doc)?
            .unwrap_or_default();
        if body.len() > max_bytes {
            skipped.push(format!(
                "{} ({} bytes > {max_bytes})",
                addressed.virtual_path(),
                body.len()
            ));
            continue;
        }
        out.push_str(&format!("==> {} <==\n{body}\n\n", addressed.virtual_path()));
    }
    if matched == 0 {
        out = format!("No documents match '{pattern}'");
    }
    if !skipped.is_empty() {
        out.push_str(&format!("skipped: {}\n", skipped.join(", ")));
    }
    Ok(out)
}

fn run_status(engine: &Engine) -> QmdResult<String> {
    let stats = engine.store.stats()?;
    let mut text = format!(
        "Collections: {}\nActive documents: {}\nContent bodies: {}\nEmbedded chunks: {}\nPending embedding: {}\n",
        stats.collection_count,
        stats.document_count,
        stats.content_count,
        stats.chunk_count,
        stats.pending_embed_count,
    );
    if !stats.collection_stats.is_empty() {
        text.push_str("\nPer collection:\n");
        let mut names: Vec<_> = stats.collection_stats.iter().collect();
        names.sort();
        for (name, count) in names {
            text.push_str(&format!("  {name}: {count} docs\n"));
        }
    }
    Ok(text)
}

fn list_docs(engine: &Engine) -> QmdResult<Vec<ResourceInfo>> {
    let docs = engine.store.documents().list_active(None, None)?;
    Ok(docs
        .into_iter()
        .map(|addressed| ResourceInfo {
            uri: encode_virtual_path(&addressed.collection_name, &addressed.doc.path),
            title: addressed.doc.title,
        })
        .collect())
}

// ── Server ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QmdMcpServer {
    handle: EngineHandle,
    tool_router: ToolRouter<Self>,
}

impl QmdMcpServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            handle: spawn_engine_thread(engine),
            tool_router: Self::tool_router(),
        }
    }

    fn search_options(p: &SearchParams) -> SearchOptions {
        SearchOptions {
            limit: p.limit.unwrap_or(20),
            min_score: p.min_score.unwrap_or(0.0),
            collection: p.collection.clone(),
        }
    }

    async fn run_search_tool(
        &self,
        kind: SearchKind,
        p: SearchParams,
    ) -> Result<CallToolResult, McpError> {
        let entries = self
            .handle
            .request(|reply| EngineRequest::Search {
                kind,
                query: p.query.clone(),
                opts: Self::search_options(&p),
                reply,
            })
            .await?;

        let summary = if entries.is_empty() {
            "No results found.".to_string()
        } else {
            entries
                .iter()
                .enumerate()
                .map(|(i, e)| format!("{}. {} (score: {:.4}) {}", i + 1, e.title, e.score, e.file))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![
            Content::text(summary),
            Content::text(json),
        ]))
    }
}

#[tool_router]
impl QmdMcpServer {
    #[tool(description = "BM25 full-text search across indexed documents")]
    async fn search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_search_tool(SearchKind::Fts, params.0).await
    }

    #[tool(description = "Vector semantic search using document embeddings")]
    async fn vsearch(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_search_tool(SearchKind::Vector, params.0).await
    }

    #[tool(
        description = "Hybrid search: BM25 + vector with query expansion, RRF fusion and reranking"
    )]
    async fn query(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run_search_tool(SearchKind::Hybrid, params.0).await
    }

    #[tool(description = "Get document content by qmd://collection/path address")]
    async fn get(&self, params: Parameters<GetParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let fetched = self
            .handle
            .request(|reply| EngineRequest::Get {
                file: p.file.clone(),
                reply,
            })
            .await?;

        match fetched {
            DocFetch::Found(body) => {
                let lines: Vec<&str> = body.lines().collect();
                let total = lines.len();
                let start = p.from.unwrap_or(1).saturating_sub(1).min(total);
                let end = match p.limit {
                    Some(limit) => (start + limit).min(total),
                    None => total,
                };
                let text = format!(
                    "{} (lines {}-{} of {})\n\n{}",
                    p.file,
                    start + 1,
                    end,
                    total,
                    lines[start..end].join("\n")
                );
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            DocFetch::Miss(similar) => {
                let mut message = format!("Document not found: {}", p.file);
                if !similar.is_empty() {
                    message.push_str("\nSimilar paths:\n");
                    for path in similar {
                        message.push_str(&format!("  {path}\n"));
                    }
                }
                Err(McpError::invalid_params(message, None))
            }
        }
    }

    #[tool(description = "Get several documents matching a path pattern, size-capped per file")]
    async fn multi_get(
        &self,
        params: Parameters<MultiGetParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let text = self
            .handle
            .request(|reply| EngineRequest::MultiGet {
                pattern: p.pattern.clone(),
                max_bytes: p.max_bytes,
                reply,
            })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Show index statistics: collections, documents, embedding backlog")]
    async fn status(&self) -> Result<CallToolResult, McpError> {
        let text = self
            .handle
            .request(|reply| EngineRequest::Status { reply })
            .await?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for QmdMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            instructions: Some(
                "qmd - on-device markdown search. Use 'search' for keyword matching, \
                 'vsearch' for semantic search, 'query' for best results combining both, \
                 'get'/'multi_get' to read documents, and 'status' for index health. \
                 Documents are also exposed as qmd://collection/path resources."
                    .into(),
            ),
            ..Default::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            let docs = self
                .handle
                .request(|reply| EngineRequest::ListDocs { reply })
                .await?;

            let resources = docs
                .into_iter()
                .map(|info| {
                    let mut raw = RawResource::new(info.uri, info.title);
                    raw.mime_type = Some("text/markdown".to_string());
                    raw.no_annotation()
                })
                .collect();
            Ok(ListResourcesResult {
                meta: None,
                resources,
                next_cursor: None,
            })
        }
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = request.uri.to_string();
            // URI segments arrive percent-encoded; the store keys on the
            // decoded form.
            let target = decode_virtual_path(&uri)
                .map(|vp| crate::store::path::build_virtual_path(&vp.collection, &vp.path))
                .unwrap_or_else(|| uri.clone());

            let fetched = self
                .handle
                .request(|reply| EngineRequest::Get {
                    file: target.clone(),
                    reply,
                })
                .await?;

            match fetched {
                DocFetch::Found(body) => Ok(ReadResourceResult {
                    contents: vec![ResourceContents::TextResourceContents {
                        uri,
                        mime_type: Some("text/markdown".to_string()),
                        text: body,
                        meta: None,
                    }],
                }),
                DocFetch::Miss(similar) => {
                    let mut message = format!("resource not found: {uri}");
                    if !similar.is_empty() {
                        message.push_str(&format!("; similar: {}", similar.join(", ")));
                    }
                    Err(McpError::resource_not_found(message, None))
                }
            }
        }
    }
}

// ── Public entry point ───────────────────────────────────────────

pub fn run_server(engine: Engine) -> Result<()> {
    let server = QmdMcpServer::new(engine);
    tokio::runtime::Runtime::new()?.block_on(async {
        let transport = rmcp::transport::io::stdio();
        let service = server.serve(transport).await?;
        service.waiting().await?;
        Ok(())
    })
}
