//! The retrieval-augmented answer pipeline.
//!
//! [`Pipeline::answer`] runs one request through variant generation,
//! concurrent embedding and search, reranking and grounded generation, then
//! persists the session. Downstream failures never surface as errors: the
//! request ends in the templated fallback answer instead.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// Context packing and answer generation.
pub mod generator;
/// Request orchestration.
pub mod pipeline;

pub use generator::{Answer, AnswerGenerator, NO_CONTEXT_ANSWER, PackedContext};
pub use pipeline::{
    Pipeline, PipelineInfo, PipelineResponse, QueryRequest, RetrievalReport, fallback_answer,
};
