//! External model providers: Gemini, OpenAI-compatible APIs, Ollama and a
//! scripted mock.
//!
//! Every provider implements both [`EmbeddingProvider`] and
//! [`GenerationProvider`]; [`build_embedding_provider`] and
//! [`build_generation_provider`] select one from configuration.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::missing_panics_doc,
        reason = "Test allows"
    )
)]

/// Google Gemini provider.
pub mod gemini;
/// Scripted provider for tests and offline runs.
pub mod mock;
/// Ollama provider.
pub mod ollama;
/// OpenAI-compatible provider.
pub mod openai;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

use ragline_core::config::{GenerationConfig, ProviderConfig, ProviderKind};
use ragline_core::{EmbeddingProvider, Error, GenerationProvider, Result};
use std::sync::Arc;

fn gemini(config: &ProviderConfig) -> Result<GeminiProvider> {
    let api_key = config
        .api_key(ProviderKind::Gemini)
        .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_owned()))?;
    Ok(GeminiProvider::new(api_key)?.with_base_url(config.gemini_base_url.clone()))
}

fn openai(config: &ProviderConfig) -> Result<OpenAiCompatibleProvider> {
    let api_key = config
        .api_key(ProviderKind::OpenAi)
        .ok_or_else(|| Error::Config("OPENAI_API_KEY not set".to_owned()))?;
    Ok(OpenAiCompatibleProvider::new(api_key)?.with_base_url(config.openai_base_url.clone()))
}

/// Build the embedding provider named by `config.embedding`.
///
/// # Errors
/// Returns an error if the provider's API key or URL is missing or invalid.
pub fn build_embedding_provider(
    config: &ProviderConfig,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let model = config.embedding_model.clone();
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding {
        ProviderKind::Gemini => {
            let provider = gemini(config)?;
            Arc::new(match model {
                Some(model) => provider.with_embedding_model(model),
                None => provider,
            })
        }
        ProviderKind::OpenAi => {
            let provider = openai(config)?.with_dimensions(dimension);
            Arc::new(match model {
                Some(model) => provider.with_embedding_model(model),
                None => provider,
            })
        }
        ProviderKind::Ollama => {
            let provider = OllamaProvider::new(&config.ollama_url)?;
            Arc::new(match model {
                Some(model) => provider.with_embedding_model(model),
                None => provider,
            })
        }
        ProviderKind::Mock => Arc::new(MockProvider::new(dimension)),
    };
    tracing::info!(provider = provider.name(), "embedding provider ready");
    Ok(provider)
}

/// Build the generation provider named by `config.generation`.
///
/// # Errors
/// Returns an error if the provider's API key or URL is missing or invalid.
pub fn build_generation_provider(
    config: &ProviderConfig,
    generation: &GenerationConfig,
) -> Result<Arc<dyn GenerationProvider>> {
    let model = config.generation_model.clone();
    let (temperature, max_tokens) = (generation.temperature, generation.max_output_tokens);
    let provider: Arc<dyn GenerationProvider> = match config.generation {
        ProviderKind::Gemini => {
            let provider = gemini(config)?.with_sampling(temperature, max_tokens);
            Arc::new(match model {
                Some(model) => provider.with_generation_model(model),
                None => provider,
            })
        }
        ProviderKind::OpenAi => {
            let provider = openai(config)?.with_sampling(temperature, max_tokens);
            Arc::new(match model {
                Some(model) => provider.with_chat_model(model),
                None => provider,
            })
        }
        ProviderKind::Ollama => {
            let provider =
                OllamaProvider::new(&config.ollama_url)?.with_sampling(temperature, max_tokens);
            Arc::new(match model {
                Some(model) => provider.with_generation_model(model),
                None => provider,
            })
        }
        ProviderKind::Mock => Arc::new(MockProvider::new(0)),
    };
    tracing::info!(provider = provider.name(), "generation provider ready");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_providers_need_no_credentials() {
        let config = ProviderConfig {
            embedding: ProviderKind::Mock,
            generation: ProviderKind::Mock,
            ..ProviderConfig::default()
        };
        let embedder = build_embedding_provider(&config, 8).expect("mock embedder");
        let generator =
            build_generation_provider(&config, &GenerationConfig::default()).expect("mock generator");
        assert_eq!(embedder.name(), "mock");
        assert_eq!(generator.name(), "mock");
    }

    #[test]
    fn explicit_gemini_key_builds_provider() {
        let config = ProviderConfig {
            gemini_api_key: Some("test_key".to_owned()),
            embedding_model: Some("embedding-001".to_owned()),
            ..ProviderConfig::default()
        };
        let embedder = build_embedding_provider(&config, 768).expect("gemini embedder");
        assert_eq!(embedder.name(), "Gemini");
    }

    #[test]
    fn ollama_needs_valid_url() {
        let config = ProviderConfig {
            embedding: ProviderKind::Ollama,
            ollama_url: "::".to_owned(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            build_embedding_provider(&config, 768),
            Err(Error::Config(_))
        ));
    }
}
