//! Maximum-marginal-relevance diversification.
//!
//! Greedy re-ranking that trades relevance against redundancy:
//! `mmr(d) = λ·rel(d) − (1−λ)·max_{s∈selected} sim(d, s)`.
//! Similarity uses content token overlap, which is enough to collapse
//! near-duplicate chunks from the same document without re-embedding.

use std::collections::HashSet;

use spaces_core::ChunkHit;

fn token_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(String::from)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    inter / union
}

/// Greedy MMR re-rank. `lambda` ∈ [0, 1]: 1.0 keeps the relevance order,
/// 0.0 maximizes diversity. Input hits must be sorted by relevance
/// descending; their `score` is the relevance term.
pub fn mmr_rerank(hits: Vec<ChunkHit>, lambda: f32, limit: usize) -> Vec<ChunkHit> {
    if hits.len() <= 1 {
        return hits;
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let tokens: Vec<HashSet<String>> = hits.iter().map(|h| token_set(&h.content)).collect();
    let mut remaining: Vec<usize> = (0..hits.len()).collect();
    let mut selected: Vec<usize> = Vec::new();

    while !remaining.is_empty() && selected.len() < limit {
        let mut best_pos = 0usize;
        let mut best_value = f32::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let relevance = hits[idx].score.unwrap_or(0.0);
            let redundancy = selected
                .iter()
                .map(|&s| jaccard(&tokens[idx], &tokens[s]))
                .fold(0.0f32, f32::max);
            let value = lambda * relevance - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }

    let mut keep: Vec<Option<ChunkHit>> = hits.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|idx| keep[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(document_id: i64, chunk_index: i32, content: &str, score: f32) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: content.to_string(),
            distance: None,
            score: Some(score),
            file_name: None,
            source_type: None,
        }
    }

    #[test]
    fn lambda_one_preserves_relevance_order() {
        let hits = vec![
            hit(1, 0, "alpha beta", 0.9),
            hit(1, 1, "alpha beta", 0.8),
            hit(2, 0, "gamma delta", 0.7),
        ];
        let out = mmr_rerank(hits, 1.0, 3);
        let ids: Vec<i64> = out.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![1_000_000, 1_000_001, 2_000_000]);
    }

    #[test]
    fn low_lambda_promotes_diverse_content() {
        let hits = vec![
            hit(1, 0, "data retention policy for europe", 0.9),
            hit(1, 1, "data retention policy for europe region", 0.85),
            hit(2, 0, "quarterly revenue figures and forecasts", 0.5),
        ];
        let out = mmr_rerank(hits, 0.3, 2);
        // The near-duplicate second chunk loses to the diverse document.
        assert_eq!(out[0].document_id, 1);
        assert_eq!(out[1].document_id, 2);
    }

    #[test]
    fn respects_limit() {
        let hits: Vec<ChunkHit> = (0..10)
            .map(|i| hit(i, 0, &format!("content {i}"), 1.0 - i as f32 * 0.05))
            .collect();
        assert_eq!(mmr_rerank(hits, 0.5, 4).len(), 4);
    }

    #[test]
    fn single_hit_passthrough() {
        let hits = vec![hit(1, 0, "only", 1.0)];
        assert_eq!(mmr_rerank(hits, 0.5, 10).len(), 1);
    }
}
