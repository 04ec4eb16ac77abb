//! Local evidence coverage heuristics.

use std::collections::HashSet;

use spaces_core::{ChunkHit, Settings};

/// Thresholds separating strong from weak coverage.
#[derive(Debug, Clone, Copy)]
pub struct CoverageThresholds {
    pub min_hits: usize,
    pub min_docs: usize,
    pub max_distance: f32,
}

impl From<&Settings> for CoverageThresholds {
    fn from(s: &Settings) -> Self {
        Self {
            min_hits: s.coverage_min_hits,
            min_docs: s.coverage_min_docs,
            max_distance: s.coverage_max_distance,
        }
    }
}

/// Evidence metrics for one retrieval round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub total_hits: usize,
    pub unique_docs: usize,
    /// Best (lowest) cosine distance among hits that carry one.
    pub best_distance: Option<f32>,
}

impl Coverage {
    pub fn evaluate(hits: &[ChunkHit]) -> Self {
        let unique_docs = hits
            .iter()
            .map(|h| h.document_id)
            .collect::<HashSet<_>>()
            .len();
        let best_distance = hits
            .iter()
            .filter_map(|h| h.distance)
            .filter(|d| d.is_finite())
            .fold(None::<f32>, |acc, d| {
                Some(acc.map_or(d, |best| best.min(d)))
            });
        Self {
            total_hits: hits.len(),
            unique_docs,
            best_distance,
        }
    }

    /// Strong iff hit count, document diversity, AND semantic quality all
    /// clear their thresholds. A missing distance (lexical-only evidence)
    /// counts as passing the distance gate.
    pub fn is_strong(&self, thresholds: CoverageThresholds) -> bool {
        self.total_hits >= thresholds.min_hits
            && self.unique_docs >= thresholds.min_docs
            && self
                .best_distance
                .map(|d| d <= thresholds.max_distance)
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(document_id: i64, chunk_index: i32, distance: Option<f32>) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: String::new(),
            distance,
            score: None,
            file_name: None,
            source_type: None,
        }
    }

    fn thresholds() -> CoverageThresholds {
        CoverageThresholds {
            min_hits: 4,
            min_docs: 2,
            max_distance: 0.55,
        }
    }

    #[test]
    fn empty_hits_are_weak() {
        let cov = Coverage::evaluate(&[]);
        assert_eq!(cov.total_hits, 0);
        assert_eq!(cov.unique_docs, 0);
        assert!(cov.best_distance.is_none());
        assert!(!cov.is_strong(thresholds()));
    }

    #[test]
    fn strong_when_all_gates_pass() {
        let hits = vec![
            hit(1, 0, Some(0.3)),
            hit(1, 1, Some(0.4)),
            hit(2, 0, Some(0.5)),
            hit(3, 0, None),
        ];
        let cov = Coverage::evaluate(&hits);
        assert_eq!(cov.total_hits, 4);
        assert_eq!(cov.unique_docs, 3);
        assert_eq!(cov.best_distance, Some(0.3));
        assert!(cov.is_strong(thresholds()));
    }

    #[test]
    fn weak_on_low_diversity() {
        let hits = vec![
            hit(1, 0, Some(0.2)),
            hit(1, 1, Some(0.2)),
            hit(1, 2, Some(0.2)),
            hit(1, 3, Some(0.2)),
        ];
        assert!(!Coverage::evaluate(&hits).is_strong(thresholds()));
    }

    #[test]
    fn weak_on_poor_distance() {
        let hits = vec![
            hit(1, 0, Some(0.9)),
            hit(2, 0, Some(0.8)),
            hit(3, 0, Some(0.95)),
            hit(4, 0, Some(0.85)),
        ];
        assert!(!Coverage::evaluate(&hits).is_strong(thresholds()));
    }

    #[test]
    fn lexical_only_evidence_passes_distance_gate() {
        let hits = vec![hit(1, 0, None), hit(2, 0, None), hit(3, 0, None), hit(4, 0, None)];
        assert!(Coverage::evaluate(&hits).is_strong(thresholds()));
    }
}
