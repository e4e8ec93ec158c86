//! Reciprocal Rank Fusion.
//!
//! Combines multiple ranked hit lists into one ranking: each document
//! scores the weighted sum of `1 / (k + rank + 1)` over the lists it
//! appears in (0-based ranks, k = 60), plus a small bonus for having
//! been at the very top of any input list. Ties keep insertion order.

use super::SearchHit;
use std::collections::HashMap;

pub const RRF_K: f64 = 60.0;

/// Bonus for ranking first in any input list.
const BEST_RANK_BONUS_TOP: f64 = 0.05;
/// Bonus for ranking in the top three of any input list.
const BEST_RANK_BONUS_NEAR: f64 = 0.02;

/// A document after fusion, carrying the metadata of its first sighting.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub hit: SearchHit,
    pub rrf_score: f64,
    /// Best 0-based rank this document held in any input list
    pub best_rank: usize,
}

/// Fuse `(list, weight)` inputs. Lists must already be ordered most
/// relevant first.
pub fn rrf_fuse(lists: &[(Vec<SearchHit>, f64)]) -> Vec<FusedHit> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, FusedHit> = HashMap::new();

    for (list, weight) in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = weight / (RRF_K + rank as f64 + 1.0);
            match by_key.get_mut(&hit.file) {
                Some(fused) => {
                    fused.rrf_score += contribution;
                    fused.best_rank = fused.best_rank.min(rank);
                }
                None => {
                    order.push(hit.file.clone());
                    by_key.insert(
                        hit.file.clone(),
                        FusedHit {
                            hit: hit.clone(),
                            rrf_score: contribution,
                            best_rank: rank,
                        },
                    );
                }
            }
        }
    }

    let mut fused: Vec<FusedHit> = order
        .into_iter()
        .map(|key| {
            let mut f = by_key.remove(&key).expect("keyed by insertion order");
            f.rrf_score += match f.best_rank {
                0 => BEST_RANK_BONUS_TOP,
                1 | 2 => BEST_RANK_BONUS_NEAR,
                _ => 0.0,
            };
            f
        })
        .collect();

    // Stable sort: equal scores keep insertion order
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}
