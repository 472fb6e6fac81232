use async_trait::async_trait;
use ragline_core::{
    EmbeddingProvider, Error, GenerationProvider, GenerationRequest, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Default OpenAI API base URL.
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Provider for any API speaking the OpenAI `/embeddings` and
/// `/chat/completions` dialect.
pub struct OpenAiCompatibleProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Bearer token.
    api_key: String,
    /// API base URL, without trailing slash.
    base_url: String,
    /// Embedding model name.
    embedding_model: String,
    /// Chat model name.
    chat_model: String,
    /// Requested embedding size, for models that support shortening.
    dimensions: Option<usize>,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum tokens per answer.
    max_tokens: u32,
}

impl OpenAiCompatibleProvider {
    /// Creates a provider for the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY not set".to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            base_url: OPENAI_API_URL.to_owned(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_owned(),
            chat_model: DEFAULT_CHAT_MODEL.to_owned(),
            dimensions: None,
            temperature: 0.2,
            max_tokens: 1024,
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

    /// Sets the chat model.
    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Ask the API for vectors of a specific size.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Sets sampling temperature and answer length.
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'req> {
    model: &'req str,
    input: &'req str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Request payload sent to the chat completion API.
#[derive(Debug, Serialize)]
struct ChatRequest<'req> {
    model: &'req str,
    messages: Vec<ChatMessage<'req>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'req> {
    role: &'static str,
    content: &'req str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: text,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                Error::EmbeddingUnavailable(format!("Embedding request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::EmbeddingUnavailable(format!(
                "Embedding API error {status}: {error_text}"
            )));
        }

        let embeddings: EmbeddingsResponse = response.json().await.map_err(|err| {
            Error::EmbeddingUnavailable(format!("Failed to parse embedding response: {err}"))
        })?;

        embeddings
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| Error::EmbeddingUnavailable("No embedding returned".to_owned()))
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                Error::GenerationUnavailable(format!("Chat completion request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::GenerationUnavailable(format!(
                "Chat completion error {status}: {error_text}"
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|err| {
            Error::GenerationUnavailable(format!("Failed to parse chat response: {err}"))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::GenerationUnavailable("No response from chat model".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn embeddings_request_omits_unset_dimensions() {
        let request = EmbeddingsRequest {
            model: "m",
            input: "text",
            dimensions: None,
        };
        let value = to_value(&request).expect("serializes");
        assert_eq!(value, json!({"model": "m", "input": "text"}));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiCompatibleProvider::new("key".to_owned())
            .expect("provider")
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
