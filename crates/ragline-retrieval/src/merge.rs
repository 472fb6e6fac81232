//! Merging per-variant search results.

use ragline_core::RetrievedChunk;
use std::collections::HashMap;

/// Union of several result lists, one entry per chunk id.
///
/// A chunk found by several variants keeps its highest similarity. The merged
/// list is ordered by similarity, then chunk id, and re-ranked from 0, so the
/// outcome does not depend on the order the lists arrive in.
pub fn merge_candidates(
    result_sets: impl IntoIterator<Item = Vec<RetrievedChunk>>,
) -> Vec<RetrievedChunk> {
    let mut best: HashMap<String, RetrievedChunk> = HashMap::new();
    for candidate in result_sets.into_iter().flatten() {
        match best.get_mut(&candidate.chunk.id) {
            Some(existing) if existing.similarity >= candidate.similarity => {}
            Some(existing) => *existing = candidate,
            None => {
                best.insert(candidate.chunk.id.clone(), candidate);
            }
        }
    }

    let mut merged: Vec<RetrievedChunk> = best.into_values().collect();
    merged.sort_by(|left, right| {
        right
            .similarity
            .total_cmp(&left.similarity)
            .then_with(|| left.chunk.id.cmp(&right.chunk.id))
    });
    for (rank, candidate) in merged.iter_mut().enumerate() {
        candidate.rank = rank;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::{Chunk, ChunkMetadata};

    fn found(id: &str, similarity: f32, rank: usize) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk::new(id, id, Vec::new(), ChunkMetadata::default()),
            similarity,
            rank,
        }
    }

    #[test]
    fn duplicates_keep_best_similarity() {
        let merged = merge_candidates([
            vec![found("a", 0.7, 0), found("b", 0.6, 1)],
            vec![found("b", 0.9, 0), found("c", 0.55, 1)],
        ]);
        let ids: Vec<&str> = merged.iter().map(|row| row.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((merged[0].similarity - 0.9).abs() < f32::EPSILON);
        assert_eq!(
            merged.iter().map(|row| row.rank).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let first = merge_candidates([
            vec![found("x", 0.8, 0)],
            vec![found("y", 0.8, 0), found("x", 0.6, 1)],
        ]);
        let second = merge_candidates([
            vec![found("y", 0.8, 0), found("x", 0.6, 1)],
            vec![found("x", 0.8, 0)],
        ]);
        let ids = |rows: &[RetrievedChunk]| {
            rows.iter()
                .map(|row| row.chunk.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), vec!["x", "y"]);
    }
}
