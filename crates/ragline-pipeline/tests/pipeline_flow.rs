//! End-to-end pipeline runs over the scripted provider and in-memory stores.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use ragline_core::config::{PersistenceMode, RagConfig};
use ragline_core::{Chunk, ChunkMetadata, Error};
use ragline_pipeline::{NO_CONTEXT_ANSWER, Pipeline, PipelineResponse, QueryRequest};
use ragline_providers::MockProvider;
use ragline_store::{Backends, MemorySessionBackend, MemoryVectorBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};

const DIMENSION: usize = 4;

struct Harness {
    pipeline: Pipeline,
    provider: MockProvider,
    vectors: Arc<MemoryVectorBackend>,
    sessions: Arc<MemorySessionBackend>,
}

fn corpus(count: usize) -> Vec<Chunk> {
    (0..count)
        .map(|idx| {
            Chunk::new(
                format!("chunk-{idx}"),
                format!("Circular economy passage {idx} about material reuse and recycling."),
                vec![1.0, 0.1 * idx as f32, 0.0, 0.0],
                ChunkMetadata::for_document(format!("Circularity Gap Report 202{idx}"))
                    .with_page(idx as u32 + 1, true),
            )
        })
        .collect()
}

fn config() -> RagConfig {
    let mut config = RagConfig::default();
    config.embedding.dimension = DIMENSION;
    config
}

fn harness_with(config: RagConfig, provider: MockProvider, chunks: Vec<Chunk>) -> Harness {
    let vectors = Arc::new(MemoryVectorBackend::with_chunks(chunks));
    let sessions = Arc::new(MemorySessionBackend::new());
    let backends = Backends {
        vectors: Arc::clone(&vectors) as _,
        sessions: Arc::clone(&sessions) as _,
    };
    let pipeline = Pipeline::new(
        config,
        Arc::new(provider.clone()),
        Arc::new(provider.clone()),
        backends,
    )
    .expect("pipeline builds");
    Harness {
        pipeline,
        provider,
        vectors,
        sessions,
    }
}

fn provider() -> MockProvider {
    MockProvider::new(DIMENSION).with_default_embedding(vec![1.0, 0.0, 0.0, 0.0])
}

fn harness() -> Harness {
    harness_with(config(), provider(), corpus(6))
}

#[tokio::test]
async fn answers_from_top_chunks_and_stores_session() {
    let harness = harness();
    let response = harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");

    assert_eq!(response.chunks.len(), 5);
    assert!(!response.answer.trim().is_empty());
    assert!(!response.error_fallback);
    assert!(!response.degraded);
    assert_eq!(harness.provider.generate_count(), 1);

    let session_id = response.session_id.expect("session stored");
    let session = harness
        .pipeline
        .sessions()
        .get(&session_id)
        .await
        .expect("session readable");
    assert_eq!(session.query_text, "What is circular economy?");
    assert_eq!(session.answer_text, response.answer);
    assert_eq!(session.chunks.len(), 5);
    assert!(session.chunks.iter().all(|ranked| ranked.chunk.embedding.is_empty()));
    assert_eq!(session.metadata["num_chunks"], 5);
    assert_eq!(session.metadata["strategy"], "enhanced");
    assert_eq!(session.metadata["reranker"], "hybrid");
    assert_eq!(session.metadata["error_fallback"], false);
    assert_eq!(
        session.metadata["correlation_id"],
        response.correlation_id.to_string()
    );
}

#[tokio::test]
async fn prompt_cites_numbered_sources() {
    let harness = harness();
    harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");

    let calls = harness.provider.generate_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("Source [1]: Circularity Gap Report"));
    assert!(calls[0].prompt.contains("(Page ~"));
    assert!(calls[0].prompt.contains("USER QUESTION: What is circular economy?"));
    assert!(!calls[0].system_instruction.is_empty());
}

#[tokio::test(start_paused = true)]
async fn embedding_timeouts_end_in_fallback() {
    let provider = provider().with_embed_delay(Duration::from_secs(30));
    let harness = harness_with(config(), provider, corpus(6));

    let response = harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("fallback is still a response");

    assert!(response.error_fallback);
    assert!(response.chunks.is_empty());
    assert!(response.answer.contains("What is circular economy?"));
    assert_eq!(harness.provider.generate_count(), 0);

    let session_id = response.session_id.expect("fallback sessions are stored");
    let session = harness.pipeline.sessions().get(&session_id).await.expect("session");
    assert_eq!(session.metadata["error_fallback"], true);
}

#[tokio::test]
async fn broken_match_function_degrades_without_fallback() {
    let harness = harness();
    harness.vectors.set_match_unavailable(true);

    let response = harness
        .pipeline
        .answer(QueryRequest {
            max_chunks: Some(3),
            ..QueryRequest::new("What is circular economy?")
        })
        .await
        .expect("answer");

    assert!(response.degraded);
    assert!(!response.error_fallback);
    assert!(!response.chunks.is_empty());
    assert!(response.chunks.len() <= 3);
}

#[tokio::test]
async fn unreachable_store_ends_in_fallback() {
    let harness = harness();
    harness.vectors.set_match_unavailable(true);
    harness.vectors.set_rows_unavailable(true);

    let response = harness
        .pipeline
        .answer(QueryRequest::new("recycling targets"))
        .await
        .expect("answer");
    assert!(response.error_fallback);
    assert!(response.chunks.is_empty());
}

#[tokio::test]
async fn empty_store_answers_without_generation() {
    let harness = harness_with(config(), provider(), Vec::new());

    let response = harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");

    assert_eq!(response.answer, NO_CONTEXT_ANSWER);
    assert!(response.chunks.is_empty());
    assert!(!response.error_fallback);
    assert_eq!(harness.provider.generate_count(), 0);
}

#[tokio::test]
async fn generation_failure_ends_in_fallback() {
    let harness = harness_with(config(), provider().failing_generation(), corpus(3));

    let response = harness
        .pipeline
        .answer(QueryRequest::new("Explain recycling"))
        .await
        .expect("answer");
    assert!(response.error_fallback);
    assert!(response.answer.contains("\"Explain recycling\""));
    assert!(response.chunks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn global_timeout_ends_in_fallback() {
    let mut config = config();
    config.pipeline.global_timeout_ms = 1_000;
    config.embedding.timeout_ms = 500;
    config.retrieval.search_timeout_ms = 500;
    config.generation.timeout_ms = 900;
    config.pipeline.persistence_timeout_ms = 500;
    let provider = provider()
        .with_embed_delay(Duration::from_millis(400))
        .with_generate_delay(Duration::from_millis(800));
    let harness = harness_with(config, provider, corpus(3));

    let response = harness
        .pipeline
        .answer(QueryRequest::new("Explain recycling"))
        .await
        .expect("answer");
    assert!(response.error_fallback);
    assert!(response.chunks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_session_save_stays_within_global_budget() {
    let mut config = config();
    config.pipeline.global_timeout_ms = 1_000;
    config.embedding.timeout_ms = 500;
    config.retrieval.search_timeout_ms = 500;
    config.generation.timeout_ms = 900;
    config.pipeline.persistence_timeout_ms = 900;
    let provider = provider().with_generate_delay(Duration::from_millis(800));
    let harness = harness_with(config, provider, corpus(3));
    harness.sessions.set_insert_delay(Some(Duration::from_secs(60)));

    let started = Instant::now();
    let response = harness
        .pipeline
        .answer(QueryRequest::new("Explain recycling"))
        .await
        .expect("answer");

    assert!(started.elapsed() <= Duration::from_millis(1_000));
    assert!(!response.error_fallback);
    assert!(!response.chunks.is_empty());
    assert!(response.session_id.is_none());
    assert!(response.processing_time_ms >= 800);
    assert!(response.processing_time_ms <= 1_000);
}

#[tokio::test(start_paused = true)]
async fn processing_time_includes_stage_delays() {
    let provider = provider()
        .with_embed_delay(Duration::from_millis(100))
        .with_generate_delay(Duration::from_millis(300));
    let harness = harness_with(config(), provider, corpus(3));

    let response = harness
        .pipeline
        .answer(QueryRequest::new("Explain recycling"))
        .await
        .expect("answer");

    assert!(response.processing_time_ms >= 400);
    let session_id = response.session_id.expect("session stored");
    let session = harness.pipeline.sessions().get(&session_id).await.expect("session");
    assert!(session.processing_time_ms >= 400);
    assert!(session.processing_time_ms <= response.processing_time_ms);
}

#[tokio::test]
async fn pipeline_clones_share_stores() {
    let harness = harness();
    let cloned = harness.pipeline.clone();

    let response = cloned
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");
    let session_id = response.session_id.expect("session stored");
    assert!(harness.pipeline.sessions().get(&session_id).await.is_ok());
    assert_eq!(
        harness.pipeline.vectors().count().await.expect("count"),
        cloned.vectors().count().await.expect("count")
    );
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let harness = harness();
    assert!(matches!(
        harness.pipeline.answer(QueryRequest::new("   ")).await,
        Err(Error::Validation(_))
    ));
    let zero = QueryRequest {
        max_chunks: Some(0),
        ..QueryRequest::new("recycling")
    };
    assert!(matches!(
        harness.pipeline.answer(zero).await,
        Err(Error::Validation(_))
    ));
    assert!(harness.provider.embed_calls().is_empty());
}

#[tokio::test]
async fn oversized_k_is_clamped() {
    let harness = harness();
    assert_eq!(harness.pipeline.resolve_k(Some(500)).expect("clamped"), 20);
    assert_eq!(harness.pipeline.resolve_k(None).expect("default"), 5);

    let response = harness
        .pipeline
        .answer(QueryRequest {
            max_chunks: Some(500),
            ..QueryRequest::new("What is circular economy?")
        })
        .await
        .expect("answer");
    assert_eq!(response.chunks.len(), 6);
}

#[tokio::test]
async fn unavailable_session_storage_keeps_the_answer() {
    let harness = harness();
    harness.sessions.set_unavailable(true);

    let response = harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");
    assert!(!response.error_fallback);
    assert_eq!(response.chunks.len(), 5);
    assert!(response.session_id.is_none());
}

#[tokio::test]
async fn background_persistence_returns_id_immediately() {
    let mut config = config();
    config.pipeline.persistence = PersistenceMode::Background;
    let harness = harness_with(config, provider(), corpus(3));

    let response = harness
        .pipeline
        .answer(QueryRequest::new("What is circular economy?"))
        .await
        .expect("answer");
    let session_id = response.session_id.expect("id assigned up front");

    let mut stored = false;
    for _ in 0..50 {
        if harness.pipeline.sessions().get(&session_id).await.is_ok() {
            stored = true;
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(stored);
}

#[tokio::test]
async fn identical_requests_rank_identically() {
    let harness = harness();
    let ids = |response: &PipelineResponse| {
        response
            .chunks
            .iter()
            .map(|ranked| ranked.chunk.id.clone())
            .collect::<Vec<_>>()
    };

    let first = harness
        .pipeline
        .answer(QueryRequest::new("recycling and material reuse"))
        .await
        .expect("first");
    let second = harness
        .pipeline
        .answer(QueryRequest::new("recycling and material reuse"))
        .await
        .expect("second");
    assert_eq!(ids(&first), ids(&second));
    assert_ne!(first.session_id, second.session_id);
}

#[tokio::test]
async fn retrieve_reports_variants_without_side_effects() {
    let harness = harness();
    let report = harness
        .pipeline
        .retrieve("What is circular economy?", Some(2))
        .await
        .expect("retrieval");

    assert_eq!(report.chunks.len(), 2);
    assert_eq!(report.variants.len(), 2);
    assert_eq!(harness.provider.generate_count(), 0);
    assert_eq!(
        harness.pipeline.sessions().stats().await.expect("stats").total_sessions,
        0
    );
}

#[tokio::test]
async fn info_names_components() {
    let harness = harness();
    let info = harness.pipeline.info();
    assert_eq!(info.embedding_provider, "mock");
    assert_eq!(info.vector_backend, "memory");
    assert_eq!(info.embedding_dimension, DIMENSION);
    assert_eq!(info.query_strategy, "enhanced");
    assert_eq!(info.persistence, "await");
}
