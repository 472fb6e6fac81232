//! Embedding client limits over the scripted provider.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use ragline_core::Error;
use ragline_core::config::EmbeddingConfig;
use ragline_providers::MockProvider;
use ragline_retrieval::EmbeddingClient;
use std::sync::Arc;
use std::time::Duration;

fn config(dimension: usize) -> EmbeddingConfig {
    EmbeddingConfig {
        dimension,
        max_input_chars: 16,
        timeout_ms: 200,
    }
}

#[tokio::test]
async fn returns_vector_of_configured_dimension() {
    let provider = MockProvider::new(8);
    let client = EmbeddingClient::new(Arc::new(provider), &config(8));

    let vector = client.embed("circular economy").await.expect("embedding");
    assert_eq!(vector.len(), 8);
    assert_eq!(client.dimension(), 8);
}

#[tokio::test]
async fn blank_text_is_rejected_without_a_call() {
    let provider = MockProvider::new(8);
    let client = EmbeddingClient::new(Arc::new(provider.clone()), &config(8));

    assert!(matches!(
        client.embed("   \n").await,
        Err(Error::Validation(_))
    ));
    assert!(provider.embed_calls().is_empty());
}

#[tokio::test]
async fn long_input_is_truncated_before_the_call() {
    let provider = MockProvider::new(8);
    let client = EmbeddingClient::new(Arc::new(provider.clone()), &config(8));

    client
        .embed("a very long query about material recovery")
        .await
        .expect("embedding");
    let calls = provider.embed_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].chars().count(), 16);
}

#[tokio::test]
async fn provider_failures_become_embedding_unavailable() {
    let failing = EmbeddingClient::new(Arc::new(MockProvider::new(8).failing_embeddings()), &config(8));
    assert!(matches!(
        failing.embed("query").await,
        Err(Error::EmbeddingUnavailable(_))
    ));

    let empty = EmbeddingClient::new(Arc::new(MockProvider::new(8).empty_embeddings()), &config(8));
    assert!(matches!(
        empty.embed("query").await,
        Err(Error::EmbeddingUnavailable(_))
    ));
}

#[tokio::test]
async fn wrong_dimension_is_embedding_unavailable() {
    let client = EmbeddingClient::new(Arc::new(MockProvider::new(3)), &config(4));
    assert!(matches!(
        client.embed("query").await,
        Err(Error::EmbeddingUnavailable(ref message)) if message.contains("expected 4")
    ));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let provider = MockProvider::new(8).with_embed_delay(Duration::from_secs(5));
    let client = EmbeddingClient::new(Arc::new(provider), &config(8));

    assert!(matches!(
        client.embed("query").await,
        Err(Error::EmbeddingUnavailable(ref message)) if message.contains("timed out")
    ));
}
