//! LLM provider interface.
//!
//! The core consumes one remote provider for embeddings, generation, and
//! reranking. Provider failures are never fatal: `embed` and `generate`
//! return `None` on any transport or protocol error and the caller
//! degrades or records an error and continues.

pub mod mock;
pub mod ollama;

use async_trait::async_trait;
use futures::future::join_all;
use log::debug;

pub use mock::MockProvider;
pub use ollama::OllamaClient;

#[derive(Debug, Clone, Default)]
pub struct EmbedOptions {
    pub model: String,
    pub is_query: bool,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub logprobs: bool,
    pub raw: bool,
    pub stop: Vec<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 256,
            temperature: 0.0,
            logprobs: false,
            raw: false,
            stop: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub logprobs: Vec<TokenLogprob>,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub exists: bool,
    pub size: Option<u64>,
    pub modified_at: Option<String>,
}

/// A document handed to the reranker.
#[derive(Debug, Clone)]
pub struct RerankDoc {
    pub file: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RerankResult {
    pub file: String,
    pub relevant: bool,
    pub confidence: f64,
    pub score: f64,
    pub raw_token: String,
    pub logprob: f64,
}

#[derive(Debug, Clone)]
pub struct RerankResponse {
    pub results: Vec<RerankResult>,
    pub model: String,
}

/// Default rerank batch size: how many relevance judgments are in
/// flight concurrently.
pub const RERANK_BATCH_SIZE: usize = 5;

/// Score for a rerank response that was neither a yes nor a no.
const RERANK_NEUTRAL_SCORE: f64 = 0.3;

/// Document text as presented to the embedding model.
pub fn format_embedding_document(title: Option<&str>, text: &str) -> String {
    format!("title: {} | text: {}", title.unwrap_or("none"), text)
}

/// Query text as presented to the embedding model.
pub fn format_embedding_query(query: &str) -> String {
    format!("task: search result | query: {query}")
}

/// Remove `<think>...</think>` blocks reasoning models wrap around their
/// output. An unterminated block is dropped to the end of the text.
pub fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Embed one text. `None` on provider failure.
    async fn embed(&self, text: &str, opts: &EmbedOptions) -> Option<EmbedResponse>;

    /// One-shot generation. `None` on provider failure.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Option<GenerateResponse>;

    async fn model_exists(&self, model: &str) -> ModelInfo;

    async fn pull_model(&self, model: &str) -> bool;

    /// Generate `count` natural-language variations of `query`. The
    /// original query is always first; on provider failure it is also
    /// the only entry.
    async fn expand_query(&self, query: &str, model: &str, count: usize) -> Vec<String> {
        let prompt = format!(
            "Rewrite the search query below into {count} alternative phrasings.\n\
             Keep proper nouns exactly as written, use synonyms for everything else,\n\
             and answer with one phrasing per line, nothing else.\n\n\
             Query: {query}"
        );
        let opts = GenerateOptions {
            model: model.to_string(),
            max_tokens: 200,
            temperature: 0.7,
            ..Default::default()
        };

        let mut expansions = vec![query.to_string()];
        if let Some(response) = self.generate(&prompt, &opts).await {
            let cleaned = strip_think_blocks(&response.text);
            for line in cleaned.lines() {
                let line = line.trim().trim_start_matches(['-', '*', ' ']).trim();
                let len = line.chars().count();
                if (3..=99).contains(&len) && line != query {
                    expansions.push(line.to_string());
                }
                if expansions.len() > count {
                    break;
                }
            }
        }
        expansions
    }

    /// Judge each document's relevance to `query` with a single-token
    /// yes/no generation, `batch_size` requests in flight at a time.
    /// Results are sorted descending by score; failed judgments get a
    /// neutral score rather than surfacing an error.
    async fn rerank(
        &self,
        query: &str,
        docs: &[RerankDoc],
        model: &str,
        batch_size: usize,
    ) -> RerankResponse {
        let mut results = Vec::with_capacity(docs.len());
        for batch in docs.chunks(batch_size.max(1)) {
            let judged = join_all(
                batch
                    .iter()
                    .map(|doc| self.rerank_single(query, doc, model)),
            )
            .await;
            results.extend(judged);
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        RerankResponse {
            results,
            model: model.to_string(),
        }
    }

    /// One yes/no relevance judgment with its token logprob folded into
    /// a score: `exp(logprob)` is the confidence; "yes" maps above 0.5,
    /// "no" below, anything unparseable lands on the neutral 0.3.
    async fn rerank_single(&self, query: &str, doc: &RerankDoc, model: &str) -> RerankResult {
        let prompt = format!(
            "Query: {query}\n\nDocument:\n{}\n\n\
             Is this document relevant to the query? Answer yes or no.",
            doc.text
        );
        let opts = GenerateOptions {
            model: model.to_string(),
            max_tokens: 3,
            temperature: 0.0,
            logprobs: true,
            ..Default::default()
        };

        let Some(response) = self.generate(&prompt, &opts).await else {
            debug!("rerank judgment failed for {}, scoring neutral", doc.file);
            return RerankResult {
                file: doc.file.clone(),
                relevant: false,
                confidence: 0.0,
                score: RERANK_NEUTRAL_SCORE,
                raw_token: String::new(),
                logprob: f64::NEG_INFINITY,
            };
        };

        let (raw_token, logprob) = match response.logprobs.first() {
            Some(first) => (first.token.clone(), first.logprob),
            None => (response.text.clone(), 0.0),
        };
        let token = strip_think_blocks(&raw_token)
            .trim()
            .to_lowercase();
        let confidence = logprob.exp();

        let (relevant, score) = if token.starts_with("yes") {
            (true, 0.5 + 0.5 * confidence)
        } else if token.starts_with("no") {
            (false, 0.5 * (1.0 - confidence))
        } else {
            (false, RERANK_NEUTRAL_SCORE)
        };

        RerankResult {
            file: doc.file.clone(),
            relevant,
            confidence,
            score,
            raw_token,
            logprob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_embedding_document() {
        assert_eq!(
            format_embedding_document(Some("Guide"), "body"),
            "title: Guide | text: body"
        );
        assert_eq!(
            format_embedding_document(None, "body"),
            "title: none | text: body"
        );
    }

    #[test]
    fn test_format_embedding_query() {
        assert_eq!(
            format_embedding_query("how to index"),
            "task: search result | query: how to index"
        );
    }

    #[test]
    fn test_strip_think_blocks() {
        assert_eq!(
            strip_think_blocks("<think>hmm\nok</think>answer"),
            "answer"
        );
        assert_eq!(strip_think_blocks("plain text"), "plain text");
        assert_eq!(
            strip_think_blocks("a<think>x</think>b<think>y</think>c"),
            "abc"
        );
        // Unterminated block drops the tail
        assert_eq!(strip_think_blocks("keep<think>lost"), "keep");
    }
}
