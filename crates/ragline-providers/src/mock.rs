//! Scripted provider for tests and offline smoke runs.
//!
//! Embeddings are deterministic (hash-based unless scripted per text) and
//! answers are matched by substring against the prompt, so a whole pipeline
//! can run without any network access.

use async_trait::async_trait;
use ragline_core::{
    EmbeddingProvider, Error, GenerationProvider, GenerationRequest, IgnoreLock as _, Result,
};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as _, Hasher as _};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Failure behaviour applied to one side of the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Failure {
    #[default]
    Healthy,
    /// Return an error immediately
    Error,
    /// Return an empty result (empty vector or blank text)
    Empty,
}

#[derive(Debug, Default)]
struct Script {
    responses: Vec<(String, String)>,
    default_response: Option<String>,
    embeddings: HashMap<String, Vec<f32>>,
    default_embedding: Option<Vec<f32>>,
    embed_failure: Failure,
    generate_failure: Failure,
    embed_delay: Option<Duration>,
    generate_delay: Option<Duration>,
}

/// Mock provider that returns pre-defined embeddings and answers.
#[derive(Clone)]
pub struct MockProvider {
    dimension: usize,
    script: Arc<Mutex<Script>>,
    embed_history: Arc<Mutex<Vec<String>>>,
    generate_history: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockProvider {
    /// Create a mock producing vectors of `dimension` entries.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            script: Arc::new(Mutex::new(Script::default())),
            embed_history: Arc::new(Mutex::new(Vec::new())),
            generate_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer with `response` whenever the prompt contains `pattern`.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.script
            .lock_ignore_poison()
            .responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Answer for prompts that match no pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        self.script.lock_ignore_poison().default_response = Some(response.into());
        self
    }

    /// Return `embedding` for exactly `text`.
    #[must_use]
    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.script
            .lock_ignore_poison()
            .embeddings
            .insert(text.into(), embedding);
        self
    }

    /// Return `embedding` for every text without a scripted vector.
    #[must_use]
    pub fn with_default_embedding(self, embedding: Vec<f32>) -> Self {
        self.script.lock_ignore_poison().default_embedding = Some(embedding);
        self
    }

    /// Make every embed call fail.
    #[must_use]
    pub fn failing_embeddings(self) -> Self {
        self.script.lock_ignore_poison().embed_failure = Failure::Error;
        self
    }

    /// Make every generate call fail.
    #[must_use]
    pub fn failing_generation(self) -> Self {
        self.script.lock_ignore_poison().generate_failure = Failure::Error;
        self
    }

    /// Make every generate call return blank text.
    #[must_use]
    pub fn blank_generation(self) -> Self {
        self.script.lock_ignore_poison().generate_failure = Failure::Empty;
        self
    }

    /// Make every embed call return an empty vector.
    #[must_use]
    pub fn empty_embeddings(self) -> Self {
        self.script.lock_ignore_poison().embed_failure = Failure::Empty;
        self
    }

    /// Sleep before answering each embed call.
    #[must_use]
    pub fn with_embed_delay(self, delay: Duration) -> Self {
        self.script.lock_ignore_poison().embed_delay = Some(delay);
        self
    }

    /// Sleep before answering each generate call.
    #[must_use]
    pub fn with_generate_delay(self, delay: Duration) -> Self {
        self.script.lock_ignore_poison().generate_delay = Some(delay);
        self
    }

    /// Texts passed to `embed`, in call order.
    #[must_use]
    pub fn embed_calls(&self) -> Vec<String> {
        self.embed_history.lock_ignore_poison().clone()
    }

    /// Requests passed to `generate`, in call order.
    #[must_use]
    pub fn generate_calls(&self) -> Vec<GenerationRequest> {
        self.generate_history.lock_ignore_poison().clone()
    }

    /// Number of `generate` calls made.
    #[must_use]
    pub fn generate_count(&self) -> usize {
        self.generate_history.lock_ignore_poison().len()
    }

    /// Deterministic pseudo-embedding derived from a hash of `text`.
    pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        (0..dimension as u64)
            .map(|idx| {
                let mixed = (hash ^ idx.wrapping_mul(0x9E37_79B9_7F4A_7C15))
                    .wrapping_mul(0xBF58_476D_1CE4_E5B9);
                ((mixed >> 40) % 1000) as f32 / 1000.0 - 0.5
            })
            .collect()
    }

    fn find_response(&self, prompt: &str) -> Option<String> {
        let script = self.script.lock_ignore_poison();
        script
            .responses
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| script.default_response.clone())
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_history.lock_ignore_poison().push(text.to_owned());

        let (delay, failure, scripted) = {
            let script = self.script.lock_ignore_poison();
            (
                script.embed_delay,
                script.embed_failure,
                script
                    .embeddings
                    .get(text)
                    .or(script.default_embedding.as_ref())
                    .cloned(),
            )
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        match failure {
            Failure::Error => Err(Error::EmbeddingUnavailable(
                "mock embedding failure".to_owned(),
            )),
            Failure::Empty => Ok(Vec::new()),
            Failure::Healthy => {
                Ok(scripted.unwrap_or_else(|| Self::hashed_embedding(text, self.dimension)))
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.generate_history.lock_ignore_poison().push(request.clone());

        let (delay, failure) = {
            let script = self.script.lock_ignore_poison();
            (script.generate_delay, script.generate_failure)
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        match failure {
            Failure::Error => Err(Error::GenerationUnavailable(
                "mock generation failure".to_owned(),
            )),
            Failure::Empty => Ok(String::new()),
            Failure::Healthy => Ok(self.find_response(&request.prompt).unwrap_or_else(|| {
                let question = request.prompt.lines().next_back().unwrap_or_default();
                format!("Mock answer based on the provided sources. {question}")
            })),
        }
    }
}
