//! Candidate reranking.
//!
//! `hybrid` fuses min-max normalized vector similarity with max-normalized
//! BM25 over the candidate texts, then optionally multiplies in metadata
//! priors. `none` keeps retrieval order.

mod bm25;
mod priors;

pub use bm25::LexicalIndex;
pub use priors::MetadataPriors;

use ragline_core::config::{RerankConfig, RerankStrategy};
use ragline_core::{RankedChunk, Result, RetrievedChunk};
use std::cmp::Ordering;
use tracing::debug;

/// Reorders merged candidates before generation.
#[derive(Debug, Clone)]
pub struct Reranker {
    strategy: RerankStrategy,
    vector_weight: f32,
    lexical_weight: f32,
    priors: Option<MetadataPriors>,
}

impl Reranker {
    /// Build a reranker from settings.
    ///
    /// # Errors
    /// Returns an error if the metadata priors cannot be built.
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let priors = if config.metadata_priors {
            Some(MetadataPriors::new(config)?)
        } else {
            None
        };
        Ok(Self {
            strategy: config.strategy,
            vector_weight: config.vector_weight,
            lexical_weight: config.lexical_weight,
            priors,
        })
    }

    /// Active strategy
    pub fn strategy(&self) -> RerankStrategy {
        self.strategy
    }

    /// Score and order `candidates` for `query`.
    ///
    /// Output is a permutation of the input. Equal scores keep retrieval
    /// rank order, so the same input always yields the same output.
    pub fn rerank(&self, query: &str, candidates: Vec<RetrievedChunk>) -> Vec<RankedChunk> {
        let mut ranked = match self.strategy {
            RerankStrategy::None => candidates
                .into_iter()
                .map(|candidate| RankedChunk {
                    combined_score: candidate.similarity,
                    similarity: candidate.similarity,
                    lexical_score: 0.0,
                    retrieval_rank: candidate.rank,
                    chunk: candidate.chunk,
                })
                .collect(),
            RerankStrategy::Hybrid => self.hybrid(query, candidates),
        };

        ranked.sort_by(|left, right| {
            match self.strategy {
                RerankStrategy::None => Ordering::Equal,
                RerankStrategy::Hybrid => right.combined_score.total_cmp(&left.combined_score),
            }
            .then_with(|| left.retrieval_rank.cmp(&right.retrieval_rank))
        });
        debug!(
            strategy = self.strategy.as_str(),
            count = ranked.len(),
            "reranked candidates"
        );
        ranked
    }

    fn hybrid(&self, query: &str, candidates: Vec<RetrievedChunk>) -> Vec<RankedChunk> {
        let similarities = normalize_min_max(
            &candidates
                .iter()
                .map(|candidate| candidate.similarity)
                .collect::<Vec<_>>(),
        );
        let lexical = normalize_by_max(
            &LexicalIndex::build(candidates.iter().map(|candidate| candidate.chunk.text.as_str()))
                .scores(query),
        );

        candidates
            .into_iter()
            .zip(similarities.into_iter().zip(lexical))
            .map(|(candidate, (vector, lexical_score))| {
                let fused = self
                    .vector_weight
                    .mul_add(vector, self.lexical_weight * lexical_score);
                let prior = self
                    .priors
                    .as_ref()
                    .map_or(1.0, |priors| priors.weight(&candidate.chunk.metadata));
                RankedChunk {
                    combined_score: fused * prior,
                    similarity: candidate.similarity,
                    lexical_score,
                    retrieval_rank: candidate.rank,
                    chunk: candidate.chunk,
                }
            })
            .collect()
    }
}

/// Min-max scale into `[0, 1]`; a flat set maps to 1.0 throughout.
fn normalize_min_max(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;
    if !spread.is_finite() || spread <= f32::EPSILON {
        return vec![1.0; values.len()];
    }
    values.iter().map(|value| (value - min) / spread).collect()
}

/// Divide by the largest value; all-zero input stays zero.
fn normalize_by_max(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|value| value / max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_handles_flat_input() {
        assert_eq!(normalize_min_max(&[0.4, 0.4]), vec![1.0, 1.0]);
        assert!(normalize_min_max(&[]).is_empty());
        let scaled = normalize_min_max(&[0.5, 1.0, 0.75]);
        assert!((scaled[0]).abs() < 1e-6);
        assert!((scaled[1] - 1.0).abs() < 1e-6);
        assert!((scaled[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn max_normalization_keeps_zeros() {
        assert_eq!(normalize_by_max(&[0.0, 0.0]), vec![0.0, 0.0]);
        let scaled = normalize_by_max(&[2.0, 1.0]);
        assert!((scaled[1] - 0.5).abs() < 1e-6);
    }
}
