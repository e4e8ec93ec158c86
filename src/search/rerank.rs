//! Rerank blending.
//!
//! The fused candidate list is re-scored by blending each candidate's
//! reciprocal fused rank with the LLM's yes/no relevance judgment. The
//! blend trusts fusion more at the top of the list and the reranker more
//! further down.

/// How many fused candidates are offered to the reranker.
pub const RERANK_CANDIDATES: usize = 30;

/// How much document text each relevance judgment sees.
pub const RERANK_EXCERPT_CHARS: usize = 1500;

/// Score a rerank result contributes when the judgment is missing.
pub const RERANK_MISSING_SCORE: f64 = 0.3;

/// Fusion weight by 1-based fused rank: top hits keep three quarters of
/// their reciprocal-rank score, the tail keeps less than half.
pub fn rrf_weight(rrf_rank: usize) -> f64 {
    if rrf_rank <= 3 {
        0.75
    } else if rrf_rank <= 10 {
        0.60
    } else {
        0.40
    }
}

/// Blend a candidate's 1-based fused rank with its rerank score.
pub fn blend(rrf_rank: usize, rerank_score: f64) -> f64 {
    let w = rrf_weight(rrf_rank);
    w * (1.0 / rrf_rank as f64) + (1.0 - w) * rerank_score
}

/// First `max_chars` characters of a body, for the rerank prompt.
pub fn excerpt(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &body[..byte_idx],
        None => body,
    }
}
