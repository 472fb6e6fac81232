//! Vector search over a pluggable row store, with a degraded fallback path.

use ragline_core::config::{FallbackRanking, RetrievalConfig};
use ragline_core::{Chunk, Error, Result, RetrievedChunk, SearchOutcome, VectorBackend};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 for vectors of different length or zero magnitude.
pub fn cosine_similarity(vector_a: &[f32], vector_b: &[f32]) -> f32 {
    if vector_a.len() != vector_b.len() {
        return 0.0;
    }

    let dot_product: f32 = vector_a
        .iter()
        .zip(vector_b.iter())
        .map(|(x, y)| x * y)
        .sum();
    let magnitude_a = vector_a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b = vector_b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0)
}

/// Sort by similarity descending; equal scores keep their incoming order.
fn sort_by_similarity(rows: &mut [RetrievedChunk]) {
    rows.sort_by(|first, second| {
        second
            .similarity
            .partial_cmp(&first.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

fn assign_ranks(rows: &mut [RetrievedChunk]) {
    for (rank, row) in rows.iter_mut().enumerate() {
        row.rank = rank;
    }
}

/// Chunk store with similarity search.
///
/// Search first asks the backend's server-side similarity function. If that
/// fails for any reason the store fetches plain rows instead and marks the
/// outcome degraded.
#[derive(Clone)]
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    dimension: usize,
    search_timeout: Duration,
    fallback_overfetch: usize,
    fallback_ranking: FallbackRanking,
}

impl VectorStore {
    /// Create a store over `backend` for vectors of `dimension` entries.
    pub fn new(backend: Arc<dyn VectorBackend>, config: &RetrievalConfig, dimension: usize) -> Self {
        Self {
            backend,
            dimension,
            search_timeout: Duration::from_millis(config.search_timeout_ms),
            fallback_overfetch: config.fallback_overfetch.max(1),
            fallback_ranking: config.fallback_ranking,
        }
    }

    /// Backend name for logging.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Configured dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.dimension {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            })
        }
    }

    /// Insert or replace a chunk by id.
    ///
    /// # Errors
    /// Returns [`Error::DimensionMismatch`] for wrongly sized embeddings, or
    /// the backend's error if the write fails.
    pub async fn store(&self, chunk: &Chunk) -> Result<()> {
        self.check_dimension(&chunk.embedding)?;
        self.backend.upsert(chunk).await?;
        debug!(id = %chunk.id, backend = self.backend.name(), "stored chunk");
        Ok(())
    }

    /// Find up to `top_k` chunks similar to `embedding`.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for `top_k == 0`, [`Error::DimensionMismatch`]
    /// for a wrongly sized query, or [`Error::StorageUnavailable`] when both
    /// the primary and the fallback path fail.
    pub async fn search(&self, embedding: &[f32], top_k: usize, threshold: f32) -> Result<SearchOutcome> {
        if top_k == 0 {
            return Err(Error::Validation("top_k must be positive".to_owned()));
        }
        self.check_dimension(embedding)?;

        let primary_error = match timeout(
            self.search_timeout,
            self.backend.match_chunks(embedding, top_k, threshold),
        )
        .await
        {
            Ok(Ok(mut rows)) => {
                rows.retain(|row| row.similarity.is_finite() && row.similarity >= threshold);
                sort_by_similarity(&mut rows);
                rows.truncate(top_k);
                assign_ranks(&mut rows);
                return Ok(SearchOutcome {
                    chunks: rows,
                    degraded: false,
                });
            }
            Ok(Err(error)) => Error::RetrievalDegraded(error.to_string()),
            Err(_) => Error::RetrievalDegraded(format!(
                "primary search timed out after {:?}",
                self.search_timeout
            )),
        };

        warn!(
            backend = self.backend.name(),
            cause = %primary_error,
            "primary similarity search failed, using fallback row fetch"
        );

        let chunks = self.fallback(embedding, top_k).await.map_err(|error| {
            Error::StorageUnavailable(format!(
                "{primary_error}; fallback failed ({error})"
            ))
        })?;

        Ok(SearchOutcome {
            chunks,
            degraded: true,
        })
    }

    async fn fallback(&self, embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let limit = top_k.saturating_mul(self.fallback_overfetch);
        let rows = timeout(self.search_timeout, self.backend.fetch_rows(limit))
            .await
            .map_err(|_| Error::Timeout(format!("fallback fetch after {:?}", self.search_timeout)))??;

        let mut retrieved: Vec<RetrievedChunk> = match self.fallback_ranking {
            FallbackRanking::Similarity => rows
                .into_iter()
                .map(|chunk| {
                    let similarity = if chunk.embedding.len() == embedding.len() {
                        cosine_similarity(embedding, &chunk.embedding)
                    } else {
                        0.0
                    };
                    RetrievedChunk {
                        chunk,
                        similarity,
                        rank: 0,
                    }
                })
                .collect(),
            FallbackRanking::Unranked => rows
                .into_iter()
                .map(|chunk| RetrievedChunk {
                    chunk,
                    similarity: 0.0,
                    rank: 0,
                })
                .collect(),
        };

        if self.fallback_ranking == FallbackRanking::Similarity {
            sort_by_similarity(&mut retrieved);
        }
        retrieved.truncate(top_k);
        assign_ranks(&mut retrieved);
        Ok(retrieved)
    }

    /// Fetch a chunk by id.
    ///
    /// # Errors
    /// Returns the backend's error if the read fails.
    pub async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        self.backend.get(id).await
    }

    /// Delete chunks by id, returning how many were removed.
    ///
    /// # Errors
    /// Returns the backend's error if the delete fails.
    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.backend.delete(ids).await
    }

    /// Number of stored chunks.
    ///
    /// # Errors
    /// Returns the backend's error if the read fails.
    pub async fn count(&self) -> Result<usize> {
        self.backend.count().await
    }
}
