use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;
use ragline_core::{
    EmbeddingProvider, Error, GenerationProvider, GenerationRequest, Result,
};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

/// Default Ollama daemon URL.
pub const OLLAMA_URL: &str = "http://localhost:11434";
/// Default embedding model (768 dimensions).
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
/// Default generation model.
const DEFAULT_GENERATION_MODEL: &str = "llama3.1:8b";

/// Local provider backed by an Ollama daemon.
///
/// Embeddings go through `ollama-rs`; completions use the plain
/// `/api/generate` endpoint so the system instruction is sent verbatim.
pub struct OllamaProvider {
    ollama: Ollama,
    client: Client,
    base_url: String,
    embedding_model: String,
    generation_model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OllamaProvider {
    /// Creates a provider for the daemon at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute http(s) URL.
    pub fn new(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|error| Error::Config(format!("Invalid Ollama URL '{url}': {error}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Config(format!("Ollama URL '{url}' has no host")))?;
        let port = parsed.port_or_known_default().unwrap_or(11434);
        let base_url = format!("{}://{host}:{port}", parsed.scheme());
        let endpoint = Url::parse(&base_url)
            .map_err(|error| Error::Config(format!("Invalid Ollama URL '{url}': {error}")))?;

        Ok(Self {
            ollama: Ollama::from_url(endpoint),
            client: Client::new(),
            base_url,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            generation_model: DEFAULT_GENERATION_MODEL.to_owned(),
            temperature: 0.2,
            max_output_tokens: 1024,
        })
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Sets the generation model.
    #[must_use]
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }

    /// Sets sampling temperature and answer length.
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Ollama API request for generation
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'req> {
    model: &'req str,
    prompt: &'req str,
    system: &'req str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response for generation
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request =
            GenerateEmbeddingsRequest::new(self.embedding_model.clone(), text.to_owned().into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| {
                let error_str = format!("{error:?}");
                if error_str.contains("model") && error_str.contains("not found") {
                    Error::EmbeddingUnavailable(format!(
                        "Embedding model '{}' not found. Run: ollama pull {}",
                        self.embedding_model, self.embedding_model
                    ))
                } else {
                    Error::EmbeddingUnavailable(format!("Embedding generation failed: {error}"))
                }
            })?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingUnavailable("No embeddings returned".to_owned()))
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &self.generation_model,
            prompt: &request.prompt,
            system: &request.system_instruction,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::GenerationUnavailable(format!("Ollama request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(Error::GenerationUnavailable(format!(
                "Ollama returned error: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaGenerateResponse = response.json().await.map_err(|err| {
            Error::GenerationUnavailable(format!("Failed to parse Ollama response: {err}"))
        })?;

        if ollama_response.response.trim().is_empty() {
            return Err(Error::GenerationUnavailable(
                "Ollama returned an empty response".to_owned(),
            ));
        }

        Ok(ollama_response.response)
    }
}
