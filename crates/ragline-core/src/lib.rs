//! Core types and traits for the ragline retrieval-augmented answer service.
//!
//! This crate provides the data model, error handling, configuration and the
//! trait seams (providers and storage backends) shared by every other crate.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// Runtime configuration loaded from TOML and the environment.
pub mod config;
/// Per-request context: correlation id, pipeline stage and degraded flag.
pub mod context;
/// Error types and result definitions.
pub mod error;
/// Synchronization helpers.
pub mod sync;
/// Trait definitions for providers and storage backends.
pub mod traits;
/// Core data types for chunks, variants, rankings and sessions.
pub mod types;

pub use config::RagConfig;
pub use context::{RequestContext, Stage};
pub use error::{Error, Result};
pub use sync::IgnoreLock;
pub use traits::{
    EmbeddingProvider, GenerationProvider, GenerationRequest, SessionBackend, VectorBackend,
};
pub use types::{
    Chunk, ChunkMetadata, QuerySession, QueryVariant, RankedChunk, RetrievedChunk, SaveReceipt,
    SearchOutcome, SessionStats, SessionSummary, VariantTag,
};
