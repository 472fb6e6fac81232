//! Query-side retrieval: variant generation, embedding, merging and
//! reranking of candidate chunks.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// Embedding client with limits around a provider.
pub mod embedding;
/// Per-variant result merging.
pub mod merge;
/// Query type detection and variant generation.
pub mod query;
/// Hybrid reranking.
pub mod rerank;

pub use embedding::EmbeddingClient;
pub use merge::merge_candidates;
pub use query::{QueryProcessor, QueryType};
pub use rerank::{LexicalIndex, MetadataPriors, Reranker};
