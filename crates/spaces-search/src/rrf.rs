//! Reciprocal Rank Fusion for combining ranked lists.
//!
//! `score(d) = Σ 1/(k0 + rank_i(d))` with `k0 = 60` (Cormack et al. 2009).
//! Equal fused scores break by first-insertion order across the input lists,
//! making fusion a deterministic function of its inputs.

use std::collections::HashMap;

use tracing::debug;

use spaces_core::defaults::RRF_K0;
use spaces_core::ChunkHit;

/// Fuse ranked hit lists with RRF, returning at most `limit` hits sorted by
/// fused score descending. Scores are normalized against the maximum
/// possible fused score (rank 1 in every list).
pub fn rrf_fuse(ranked_lists: Vec<Vec<ChunkHit>>, limit: usize) -> Vec<ChunkHit> {
    let num_lists = ranked_lists.len();
    let mut scores: HashMap<(i64, i32), f32> = HashMap::new();
    let mut order: Vec<(i64, i32)> = Vec::new();
    let mut payload: HashMap<(i64, i32), ChunkHit> = HashMap::new();

    for list in ranked_lists {
        for (rank, hit) in list.into_iter().enumerate() {
            let key = hit.dedupe_key();
            let rrf = 1.0 / (RRF_K0 + rank as f32 + 1.0);
            match scores.get_mut(&key) {
                Some(score) => {
                    *score += rrf;
                    // A later list may carry the distance the first lacked.
                    if let Some(existing) = payload.get_mut(&key) {
                        if existing.distance.is_none() {
                            existing.distance = hit.distance;
                        }
                    }
                }
                None => {
                    scores.insert(key, rrf);
                    order.push(key);
                    payload.insert(key, hit);
                }
            }
        }
    }

    if order.is_empty() {
        return Vec::new();
    }

    let max_possible = num_lists.max(1) as f32 / (RRF_K0 + 1.0);

    // Stable sort keyed on score only: equal scores keep insertion order.
    let mut keys = order;
    keys.sort_by(|a, b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut results: Vec<ChunkHit> = keys
        .into_iter()
        .filter_map(|key| {
            let mut hit = payload.remove(&key)?;
            hit.score = Some((scores[&key] / max_possible).min(1.0));
            Some(hit)
        })
        .collect();
    results.truncate(limit);

    debug!(
        subsystem = "search",
        component = "rrf",
        op = "fuse",
        input_lists = num_lists,
        rrf_k = RRF_K0,
        result_count = results.len(),
        "RRF fusion complete"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(document_id: i64, chunk_index: i32) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: format!("doc {document_id} chunk {chunk_index}"),
            distance: None,
            score: None,
            file_name: None,
            source_type: None,
        }
    }

    #[test]
    fn empty_input_fuses_to_nothing() {
        assert!(rrf_fuse(vec![], 10).is_empty());
        assert!(rrf_fuse(vec![vec![], vec![]], 10).is_empty());
    }

    #[test]
    fn spec_fusion_scenario() {
        // Semantic [A, B, C], lexical [C, D, A] with k0 = 60 fuse to
        // [A, C, B, D]: A and C tie (1/61 + 1/63) and break by insertion
        // order, as do B and D (1/62 each).
        let a = hit(1, 0);
        let b = hit(2, 0);
        let c = hit(3, 0);
        let d = hit(4, 0);

        let semantic = vec![a.clone(), b.clone(), c.clone()];
        let lexical = vec![c.clone(), d.clone(), a.clone()];

        let fused = rrf_fuse(vec![semantic, lexical], 10);
        let docs: Vec<i64> = fused.iter().map(|h| h.document_id).collect();
        assert_eq!(docs, vec![1, 3, 2, 4]);
    }

    #[test]
    fn appears_in_both_lists_beats_single_list() {
        let shared = hit(1, 0);
        let only_a = hit(2, 0);
        let only_b = hit(3, 0);

        let fused = rrf_fuse(
            vec![
                vec![only_a.clone(), shared.clone()],
                vec![only_b.clone(), shared.clone()],
            ],
            10,
        );
        assert_eq!(fused[0].document_id, 1);
    }

    #[test]
    fn top_hit_everywhere_scores_one() {
        let top = hit(1, 0);
        let fused = rrf_fuse(vec![vec![top.clone()], vec![top.clone()]], 10);
        assert!((fused[0].score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn respects_limit() {
        let list: Vec<ChunkHit> = (0..50).map(|i| hit(i, 0)).collect();
        assert_eq!(rrf_fuse(vec![list], 7).len(), 7);
    }

    #[test]
    fn deterministic_across_calls() {
        let l1: Vec<ChunkHit> = (0..10).map(|i| hit(i, 0)).collect();
        let l2: Vec<ChunkHit> = (5..15).map(|i| hit(i, 0)).collect();
        let a = rrf_fuse(vec![l1.clone(), l2.clone()], 10);
        let b = rrf_fuse(vec![l1, l2], 10);
        let ida: Vec<i64> = a.iter().map(|h| h.chunk_id).collect();
        let idb: Vec<i64> = b.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ida, idb);
    }

    #[test]
    fn same_chunk_in_both_lists_is_one_result() {
        let shared = hit(1, 2);
        let fused = rrf_fuse(vec![vec![shared.clone()], vec![shared.clone()]], 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].dedupe_key(), (1, 2));
    }
}
