use async_trait::async_trait;
use ragline_core::{
    EmbeddingProvider, Error, GenerationProvider, GenerationRequest, Result,
};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

/// Default Gemini API base URL.
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default embedding model (768 dimensions).
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
/// Default generation model.
const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";

/// Google Gemini provider for both embeddings and answer generation.
pub struct GeminiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Gemini API key.
    api_key: String,
    /// API base URL, without trailing slash.
    base_url: String,
    /// Model used by `embedContent`.
    embedding_model: String,
    /// Model used by `generateContent`.
    generation_model: String,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum tokens per answer.
    max_output_tokens: u32,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("GEMINI_API_KEY not set".to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            base_url: GEMINI_API_URL.to_owned(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            generation_model: DEFAULT_GENERATION_MODEL.to_owned(),
            temperature: 0.2,
            max_output_tokens: 1024,
        })
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
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

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> reqwest::Result<Response> {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
    }
}

/// A single text part of a Gemini content block.
#[derive(Debug, Serialize, Deserialize)]
struct Part {
    /// Text payload; absent on non-text parts.
    #[serde(default)]
    text: Option<String>,
}

/// Content block sent to and returned by Gemini.
#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_owned),
            parts: vec![Part {
                text: Some(text.to_owned()),
            }],
        }
    }
}

/// Request payload for `embedContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Request payload for `generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: format!(
                "models/{}",
                self.embedding_model.trim_start_matches("models/")
            ),
            content: Content::text(None, text),
            task_type: "RETRIEVAL_QUERY",
        };

        let response = self
            .post(&self.endpoint(&self.embedding_model, "embedContent"), &request)
            .await
            .map_err(|err| {
                Error::EmbeddingUnavailable(format!("Gemini embed request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::EmbeddingUnavailable(format!(
                "Gemini embed error {status}: {error_text}"
            )));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|err| {
            Error::EmbeddingUnavailable(format!("Failed to parse Gemini embedding: {err}"))
        })?;

        Ok(embed_response.embedding.values)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateRequest {
            system_instruction: Content::text(None, &request.system_instruction),
            contents: vec![Content::text(Some("user"), &request.prompt)],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .post(
                &self.endpoint(&self.generation_model, "generateContent"),
                &body,
            )
            .await
            .map_err(|err| {
                Error::GenerationUnavailable(format!("Gemini generate request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::GenerationUnavailable(format!(
                "Gemini generate error {status}: {error_text}"
            )));
        }

        let generate_response: GenerateResponse = response.json().await.map_err(|err| {
            Error::GenerationUnavailable(format!("Failed to parse Gemini response: {err}"))
        })?;

        if let Some(reason) = generate_response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(Error::GenerationUnavailable(format!(
                "Gemini blocked the prompt: {reason}"
            )));
        }

        let text: String = generate_response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::GenerationUnavailable(
                "No text returned by Gemini".to_owned(),
            ));
        }

        Ok(text)
    }
}
